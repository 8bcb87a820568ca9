use std::collections::BTreeMap;

use rolecall_core::config::{AppConfig, LoadOptions};
use rolecall_core::MenuCollection;
use rolecall_db::open_store;
use serde::Serialize;

use crate::commands::{runtime, CommandResult};

#[derive(Debug, Serialize)]
struct MenuListing {
    command: &'static str,
    status: &'static str,
    store: String,
    count: usize,
    menus: BTreeMap<String, BTreeMap<String, String>>,
}

impl MenuListing {
    fn new(store: String, collection: &MenuCollection) -> Self {
        let menus = collection
            .iter()
            .map(|(key, bindings)| {
                let entries = bindings
                    .iter()
                    .map(|(symbol, role_id)| (symbol.to_string(), role_id.to_string()))
                    .collect();
                (key.storage_key(), entries)
            })
            .collect();

        Self { command: "menus", status: "ok", store, count: collection.len(), menus }
    }
}

pub fn run() -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "menus",
                "config_validation",
                format!("configuration issue: {error}"),
                2,
            );
        }
    };

    let runtime = match runtime("menus") {
        Ok(runtime) => runtime,
        Err(failure) => return failure,
    };

    let result = runtime.block_on(async {
        let store = open_store(&config.store).await?;
        let menus = store.load().await?;
        Ok::<_, rolecall_core::StoreError>(MenuListing::new(store.describe(), &menus))
    });

    match result {
        Ok(listing) => match serde_json::to_string_pretty(&listing) {
            Ok(output) => CommandResult { exit_code: 0, output },
            Err(error) => CommandResult::failure("menus", "serialization", error.to_string(), 6),
        },
        Err(error) => CommandResult::failure("menus", "store_unavailable", error.to_string(), 4),
    }
}
