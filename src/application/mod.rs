//! Application services: feeds, follows, authoring, and the persistence seams they use.

pub mod error;
pub mod feed;
pub mod follow;
pub mod pagination;
pub mod posts;
pub mod repos;
