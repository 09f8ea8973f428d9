// src/models/quiz.rs

use serde::Serialize;

/// 测验快照，只在内存中构建，随后序列化为一个 JSON 文档
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QuizSnapshot {
    pub quiz_title: String,
    pub source_url: String,
    pub questions: Vec<QuestionBlock>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QuestionBlock {
    pub prompt: String,
    pub options: Vec<AnswerOption>,
    /// 只有在查看页面公开时才存在
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correct_answer: Option<CorrectAnswer>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct AnswerOption {
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CorrectAnswer {
    /// 与 `options` 对应的下标，可能为空（例如填空题）
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub option_indices: Vec<usize>,
    /// 页面上显示的原文 (例如 "The correct answer is: Paris")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}
