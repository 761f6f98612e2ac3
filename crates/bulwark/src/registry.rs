// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

/// Lazily populated map from service name to a shared instance.
#[derive(Debug)]
pub(crate) struct Registry<T> {
    entries: Mutex<HashMap<String, Arc<T>>>,
}

impl<T> Registry<T> {
    pub(crate) fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the instance for `name`, creating it on first reference.
    ///
    /// `create` runs under the registry lock so two callers never create competing instances.
    pub(crate) fn get_or_create(&self, name: &str, create: impl FnOnce() -> T) -> Arc<T> {
        let mut entries = self.entries.lock();
        if let Some(existing) = entries.get(name) {
            return Arc::clone(existing);
        }

        let created = Arc::new(create());
        entries.insert(name.to_string(), Arc::clone(&created));
        created
    }

    pub(crate) fn get(&self, name: &str) -> Option<Arc<T>> {
        self.entries.lock().get(name).cloned()
    }

    pub(crate) fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.entries.lock().keys().cloned().collect();
        names.sort();
        names
    }
}
