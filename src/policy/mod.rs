pub mod popularity;

pub use popularity::{Candidate, LeastPopular, VictimSelector};
