pub mod extraction;
pub mod vision; // Generative vision model client + response parsing
