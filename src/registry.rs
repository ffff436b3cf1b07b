//! Editor-provider registry: which editors handle entities of a given kind.
//!
//! Each key maps to the editors registered for it, in registration order, with one designated
//! default. The registry is a cheap-to-clone handle over shared state, so the project root can
//! hand it to every component that needs it.

use parking_lot::RwLock;
use std::{collections::HashMap, fmt::Debug, hash::Hash, sync::Arc};

use crate::error::RideError;

#[derive(Debug)]
struct Entry<E> {
    editors: Vec<E>,
    default: usize,
}

pub struct Registry<K, E>(Arc<RwLock<HashMap<K, Entry<E>>>>);

/// Keys are entity kinds (`"testcase"`, `"keyword"`, `"resource"` ...), editors are identifiers.
pub type EditorRegistry = Registry<String, String>;

impl<K, E> Clone for Registry<K, E> {
    fn clone(&self) -> Self {
        Registry(Arc::clone(&self.0))
    }
}

impl<K, E> Default for Registry<K, E> {
    fn default() -> Self {
        Registry(Arc::new(RwLock::new(HashMap::new())))
    }
}

impl<K: Debug, E: Debug> Debug for Registry<K, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Registry").field(&*self.0.read()).finish()
    }
}

impl<K, E> Registry<K, E>
where
    K: Eq + Hash + Clone + Debug,
    E: Clone + PartialEq + Debug,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `editor` for `key`. The first editor of a key is its default until another one is
    /// registered with `default` set. Registering an editor twice only updates the default.
    pub fn register(&self, key: K, editor: E, default: bool) {
        let mut writer = self.0.write();
        let entry = writer.entry(key.clone()).or_insert_with(|| Entry {
            editors: Vec::new(),
            default: 0,
        });
        let index = match entry.editors.iter().position(|e| *e == editor) {
            Some(index) => index,
            None => {
                entry.editors.push(editor);
                entry.editors.len() - 1
            }
        };
        if default {
            tracing::debug!("[Registry] Default editor for {:?} is now #{}", key, index);
            entry.default = index;
        }
    }

    /// Make an already registered editor the default for `key`.
    pub fn set_default(&self, key: &K, editor: &E) -> Result<(), RideError> {
        let mut writer = self.0.write();
        let entry = writer
            .get_mut(key)
            .ok_or_else(|| RideError::NotFound(format!("editors for {key:?}")))?;
        entry.default = entry
            .editors
            .iter()
            .position(|e| e == editor)
            .ok_or_else(|| RideError::NotFound(format!("editor {editor:?} for {key:?}")))?;
        Ok(())
    }

    /// The default editor for `key`.
    pub fn get(&self, key: &K) -> Option<E> {
        let reader = self.0.read();
        let entry = reader.get(key)?;
        entry.editors.get(entry.default).cloned()
    }

    /// Every editor registered for `key`, in registration order.
    pub fn get_all(&self, key: &K) -> Vec<E> {
        self.0
            .read()
            .get(key)
            .map(|e| e.editors.clone())
            .unwrap_or_default()
    }

    /// Remove `editor` from `key`. When it was the default, the first remaining editor takes
    /// over.
    pub fn unregister(&self, key: &K, editor: &E) -> bool {
        let mut writer = self.0.write();
        let Some(entry) = writer.get_mut(key) else {
            return false;
        };
        let Some(index) = entry.editors.iter().position(|e| e == editor) else {
            return false;
        };
        entry.editors.remove(index);
        if entry.default == index {
            entry.default = 0;
        } else if entry.default > index {
            entry.default -= 1;
        }
        if entry.editors.is_empty() {
            writer.remove(key);
        }
        true
    }
}
