// src/crawler/mod.rs

pub mod classify;
mod course;
mod outline;

pub use classify::{Classification, EntryMarkup, classify, classify_url};
pub use course::CourseLinkEnumerator;
pub use outline::{CourseOutline, OutlineItem, OutlineSection};
