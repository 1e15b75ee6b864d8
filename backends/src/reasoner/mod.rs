mod openai;

pub use openai::HttpReasoner;
