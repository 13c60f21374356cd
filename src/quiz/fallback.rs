//! The fixed quiz served when generation cannot produce a valid one

use super::QuizQuestion;

const FALLBACK: [(&str, [&str; 4], &str); 5] = [
    (
        "What is the main topic discussed in the document?",
        [
            "General information",
            "The specific subject matter covered",
            "Historical background",
            "Future predictions",
        ],
        "The document primarily focuses on the specific subject matter it was designed to cover.",
    ),
    (
        "Which of the following best describes the document's purpose?",
        ["Entertainment", "Educational content", "Advertisement", "Fiction"],
        "The document appears to be designed for educational purposes, providing information and insights.",
    ),
    (
        "What type of information is most likely emphasized?",
        [
            "Personal opinions",
            "Factual content and analysis",
            "Speculation",
            "Fictional narratives",
        ],
        "Educational documents typically emphasize factual content and analytical insights.",
    ),
    (
        "How should the information in this document be used?",
        [
            "As absolute truth without verification",
            "As a starting point for further research",
            "For entertainment purposes only",
            "As a replacement for professional advice",
        ],
        "Educational content should be used as a foundation for learning and further exploration.",
    ),
    (
        "What is the most important takeaway from this document?",
        [
            "Memorization of facts",
            "Understanding of key concepts",
            "Entertainment value",
            "Personal opinions",
        ],
        "The primary goal is to develop understanding of the key concepts presented.",
    ),
];

/// Every fallback question's correct option is the second one
const CORRECT_OPTION: usize = 1;

pub(super) fn questions() -> Vec<QuizQuestion> {
    FALLBACK
        .iter()
        .zip(1u32..)
        .map(|((prompt, options, explanation), id)| QuizQuestion {
            id,
            prompt: (*prompt).to_string(),
            options: options.map(str::to_string),
            correct_option: CORRECT_OPTION,
            explanation: (*explanation).to_string(),
        })
        .collect()
}
