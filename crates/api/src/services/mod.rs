//! Data access over PostgreSQL

pub mod books;
pub mod reviews;
pub mod tags;
pub mod users;

pub use books::{Book, BookCreate, BookDetail, BookPatch, BookService};
pub use reviews::{Review, ReviewCreate, ReviewPatch, ReviewService};
pub use tags::{Tag, TagAdd, TagCreate, TagService};
pub use users::{NewUser, PgUserStore, User, UserStore};
