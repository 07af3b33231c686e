pub mod template_loader;

pub use template_loader::{load_source_folder, load_template};
