pub mod chapter;
pub mod marine;
pub mod person;

pub use chapter::ChapterService;
pub use marine::MarineService;
pub use person::PersonService;
