pub mod loader;
pub mod types;

pub use loader::{load_bars_csv, LoaderError, REQUIRED_COLUMNS};
pub use types::Bar;
