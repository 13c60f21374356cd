//! Fixed instructional prompts and the synthesized conversation texts
//!
//! None of these are user-editable. The summary and quiz prompts are the
//! contract with the model: the quiz validator expects exactly the shape the
//! quiz prompt asks for.

/// Number of questions the quiz prompt asks for
pub const QUIZ_QUESTION_COUNT: usize = 5;

/// Number of options per quiz question
pub const QUIZ_OPTION_COUNT: usize = 4;

const QUIZ_PROMPT: &str = r#"Based on the attached document, create a multiple-choice quiz with exactly 5 questions. Respond ONLY with a valid JSON array. Each object in the array must have these keys: "question", "options" (an array of 4 strings), "correctAnswer" (integer index 0-3), and "explanation"."#;

/// Prompt for the initial three-section summary in `language`
pub fn summary_prompt(language: &str) -> String {
    format!(
        "Act as an expert academic assistant. Your task is to analyze the attached document and create a high-quality, precise summary in the {language} language.

The summary must be structured as follows:
1. **Key Concepts**: A bulleted list of the most critical concepts, terms, and definitions.
2. **Detailed Breakdown**: A more thorough explanation of the main arguments, findings, or steps presented in the document.
3. **Examples**: If applicable, include 1-2 key examples from the document to illustrate the concepts.

Use clear headings and markdown for formatting. Ensure any mathematical formulas are enclosed in single '$' for inline math or double '$$' for block math."
    )
}

pub fn quiz_prompt() -> &'static str {
    QUIZ_PROMPT
}

/// The user turn recorded when analysis starts
pub fn initial_user_message(display_name: &str, language: &str) -> String {
    format!(
        "I've uploaded a document named \"{display_name}\". Please analyze it and provide a summary in {language}."
    )
}

/// Visible model turn that replaces a failed summary
pub fn summary_error_text(reason: &str) -> String {
    format!(
        "Sorry, I encountered an error while analyzing your file. Please try again. Error: {reason}"
    )
}

/// Visible model turn that replaces a failed chat reply
pub fn chat_error_text(reason: &str) -> String {
    format!(
        "Sorry, I encountered an error while processing your question. Please try again. Error: {reason}"
    )
}
