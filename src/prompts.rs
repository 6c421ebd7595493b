//! System instructions for the rewriting and answering calls.

/// Default knowledge domain the assistant is framed around.
pub const DEFAULT_DOMAIN: &str = "Data Structures and Algorithms";
/// Exact reply expected when the retrieved context does not hold the answer.
pub const DEFAULT_REFUSAL: &str = "I could not find the answer in the provided document.";

/// Domain framing plus refusal string shared by both instructions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplates {
    domain: String,
    refusal: String,
}

impl PromptTemplates {
    /// Builds templates for the given domain and refusal string.
    pub fn new(domain: impl Into<String>, refusal: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            refusal: refusal.into(),
        }
    }

    /// Configured knowledge domain.
    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// Configured refusal string.
    pub fn refusal(&self) -> &str {
        &self.refusal
    }

    /// Instruction for turning the latest user turn into a standalone question.
    pub fn rewrite_instruction(&self) -> String {
        format!(
            "You are a query rewriting expert. Based on the provided chat history, rephrase the latest user question into a complete, standalone question that can be understood without the chat history.\n\n\
             Rules:\n\
             - Resolve every reference to earlier turns (pronouns, \"it\", \"that one\", \"the previous approach\").\n\
             - Only output the rewritten question and nothing else: no preamble, quotes, or commentary.\n\
             - If this is the first question or it does not need earlier context, return it exactly as-is.\n\
             - Ensure the rewritten question is clear and specific.\n\
             - Interpret ambiguous terms in the context of {domain}.",
            domain = self.domain
        )
    }

    /// Instruction for answering strictly from `context`.
    pub fn answer_instruction(&self, context: &str) -> String {
        format!(
            "You are an expert {domain} teacher and mentor.\n\
             You will be given a context of relevant information and a user question.\n\
             Your task is to answer the user's question based ONLY on the provided context.\n\
             If the answer is not in the context, you must reply with exactly: \"{refusal}\"\n\
             Keep your answers clear, concise, and educational, and stay within {domain}.\n\n\
             When discussing algorithms, mention time and space complexity when relevant.\n\
             For coding problems, provide step-by-step explanations.\n\n\
             Context:\n{context}",
            domain = self.domain,
            refusal = self.refusal,
        )
    }
}

impl Default for PromptTemplates {
    fn default() -> Self {
        Self::new(DEFAULT_DOMAIN, DEFAULT_REFUSAL)
    }
}
