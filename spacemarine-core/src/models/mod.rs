pub mod chapter;
pub mod coordinates;
pub mod marine;
pub mod pagination;
pub mod person;

pub use chapter::{Chapter, ChapterInput, NewChapter};
pub use coordinates::{Coordinates, Location};
pub use marine::{
    AchievementGroup, MarineFilter, MarineInput, MarineListQuery, MarineSort, NewMarine,
    SpaceMarine, Weapon,
};
pub use pagination::{Page, PageParams, SortDirection};
pub use person::{Color, Country, NewPerson, Person, PersonInput, PersonListQuery};
