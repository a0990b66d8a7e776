pub mod chapter;
pub mod marine;
pub mod person;
pub mod procedures;

pub use chapter::ChapterRepository;
pub use marine::MarineRepository;
pub use person::PersonRepository;
pub use procedures::PgChapterProcedures;
