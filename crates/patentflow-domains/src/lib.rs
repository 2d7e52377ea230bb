pub mod patent;
pub mod techpacks;

pub use patent::{load_prompts, patent_prompts};
pub use techpacks::TechPackLibrary;
