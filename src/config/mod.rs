mod store;

pub use store::{CONFIG_FILE, StoreConfig};
