#![cfg(test)]

use std::sync::Arc;

use crate::config_parser::Config;
use crate::gateway_util::AppStateData;
use crate::store::{InMemoryStore, StoreConnectionInfo};

/// App state backed by a fresh in-memory store, returned alongside it so tests can seed or break it
pub fn get_unit_test_app_state_data(config: Config) -> (Arc<InMemoryStore>, AppStateData) {
    let memory = Arc::new(InMemoryStore::new());
    let app_state =
        AppStateData::new_with_store(Arc::new(config), StoreConnectionInfo::Memory(memory.clone()));
    (memory, app_state)
}
