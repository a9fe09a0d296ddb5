pub mod matcher;
pub mod normalize;
pub mod store;

pub use matcher::find_answer;
pub use normalize::normalize;
pub use store::{ KnowledgeBase, KnowledgeError };
