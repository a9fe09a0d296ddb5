use serde::{ Serialize, Deserialize };

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnowledgeEntry {
    #[serde(default)]
    pub topic: String,
    pub question: String,
    pub answer: String,
}

impl KnowledgeEntry {
    pub fn new(
        topic: impl Into<String>,
        question: impl Into<String>,
        answer: impl Into<String>
    ) -> Self {
        Self {
            topic: topic.into(),
            question: question.into(),
            answer: answer.into(),
        }
    }
}
