//! Argument files handed to the runner.
//!
//! One argument per line. Non-Windows hosts always get UTF-8. On Windows the runner decodes the
//! file with the active ANSI code page: content whose characters all fit a single byte of that
//! page (ASCII plus the Latin-1 letters shared by the Western code pages) is written one byte
//! per character, anything else falls back to UTF-8.

use std::{fs, path::Path};

use crate::error::RideError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Windows,
    Other,
}

impl Platform {
    pub fn current() -> Self {
        if cfg!(windows) {
            Platform::Windows
        } else {
            Platform::Other
        }
    }
}

pub fn render(args: &[String]) -> String {
    let mut text = args.join("\n");
    text.push('\n');
    text
}

fn single_byte(c: char) -> Option<u8> {
    match u32::from(c) {
        code @ 0..=0x7f | code @ 0xa0..=0xff => u8::try_from(code).ok(),
        _ => None,
    }
}

pub fn encode(text: &str, platform: Platform) -> Vec<u8> {
    if platform == Platform::Other || text.is_ascii() {
        return text.as_bytes().to_vec();
    }
    match text.chars().map(single_byte).collect::<Option<Vec<u8>>>() {
        Some(bytes) => bytes,
        None => {
            tracing::debug!("[Runner] Argument file does not fit the code page, writing UTF-8");
            text.as_bytes().to_vec()
        }
    }
}

pub fn write(path: &Path, args: &[String]) -> Result<(), RideError> {
    fs::write(path, encode(&render(args), Platform::current()))?;
    Ok(())
}
