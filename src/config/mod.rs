pub mod chatbot;

pub use chatbot::{ ChatbotConfiguration, ConfigError, ResponseProfile };
