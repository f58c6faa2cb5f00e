//! Prompt construction
//!
//! Grounded prompts come in two wordings (see [`PromptStyle`]); both instruct
//! the model to answer only from the supplied context and to cite source
//! types. The other prompts cover conversational turns, questions with no
//! matching data, document verification and document summaries.

use super::PromptStyle;
use crate::types::SimilarityHit;

/// Context substituted when a template prompt has nothing to ground on
pub const NO_DOCUMENTS_PLACEHOLDER: &str = "[No relevant documents found]";

/// Answer for conversational turns when no backend responds
pub const FALLBACK_INTRODUCTION: &str = "Hello! I'm here to help you explore your tasks and issues. Just ask me anything about your project data!";

/// Answer for questions with no matching data when no backend responds
pub const FALLBACK_NO_HITS: &str = "I couldn't find any relevant tasks or issues matching your query. Try asking about specific tasks, issues, or project details.";

/// Answer when grounded generation fails on every backend
pub const INSUFFICIENT_DATA: &str = "Insufficient data to answer.";

/// Sectioned prompt: ROLE, numbered INSTRUCTIONS and CONSTRAINTS, CONTEXT, QUERY
#[derive(Debug, Clone, Default)]
pub struct PromptTemplate {
    role: String,
    instructions: Vec<String>,
    constraints: Vec<String>,
}

impl PromptTemplate {
    pub fn new(role: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            ..Self::default()
        }
    }

    pub fn instruction(mut self, instruction: impl Into<String>) -> Self {
        self.instructions.push(instruction.into());
        self
    }

    pub fn constraint(mut self, constraint: impl Into<String>) -> Self {
        self.constraints.push(constraint.into());
        self
    }

    pub fn render(&self, context: &str, query: &str) -> String {
        let mut out = format!("ROLE: {}\n\n", self.role);

        for (title, items) in [
            ("INSTRUCTIONS", &self.instructions),
            ("CONSTRAINTS", &self.constraints),
        ] {
            if items.is_empty() {
                continue;
            }
            out.push_str(title);
            out.push_str(":\n");
            for (i, item) in items.iter().enumerate() {
                out.push_str(&format!("{}. {}\n", i + 1, item));
            }
            out.push('\n');
        }

        out.push_str(&format!("CONTEXT:\n{}\n\nQUERY: {}\n\nRESPONSE:", context, query));
        out
    }
}

/// `[source_type] content` entries separated by rules
pub fn template_context(hits: &[SimilarityHit]) -> String {
    if hits.is_empty() {
        return NO_DOCUMENTS_PLACEHOLDER.to_string();
    }
    hits.iter()
        .map(|h| format!("[{}] {}", h.source_type, h.content))
        .collect::<Vec<_>>()
        .join("\n\n---\n\n")
}

/// Numbered `--- Document n [source_type] ---` blocks
pub fn direct_context(hits: &[SimilarityHit]) -> String {
    hits.iter()
        .enumerate()
        .map(|(i, h)| format!("--- Document {} [{}] ---\n{}\n\n", i + 1, h.source_type, h.content))
        .collect()
}

/// Grounded prompt over retrieved hits in the given wording
pub fn grounded_prompt(style: PromptStyle, question: &str, hits: &[SimilarityHit]) -> String {
    match style {
        PromptStyle::Template => PromptTemplate::new("Knowledge Assistant")
            .instruction("Answer the user's question using ONLY the retrieved documents")
            .instruction("Cite the source type of the information you use")
            .instruction("If the context does not contain enough information, state this clearly")
            .constraint("You MUST NOT use external knowledge")
            .constraint("You MUST NOT make assumptions")
            .constraint("If you cannot answer from context, say: 'Insufficient data to answer.'")
            .render(&template_context(hits), question),
        PromptStyle::Direct => format!(
            "You are a helpful assistant that answers questions using ONLY the provided context.\n\n\
             STRICT RULES:\n\
             1. Answer ONLY using information from the context below\n\
             2. If the context does not contain enough information to answer the question, respond with: \"{insufficient}\"\n\
             3. Do NOT make up or infer information not present in the context\n\
             4. Do NOT use any external knowledge\n\
             5. Be concise and direct in your response\n\
             6. Reference the source type (task, issue, comment, document) when relevant\n\n\
             CONTEXT:\n{context}\n\
             USER QUESTION:\n{question}\n\n\
             ANSWER:",
            insufficient = INSUFFICIENT_DATA,
            context = direct_context(hits),
            question = question,
        ),
    }
}

/// Prompt for greetings, thanks and questions about the assistant
pub fn introduction_prompt(question: &str) -> String {
    format!(
        "You are an assistant built into a task and issue management system. \
         You help people query their organization's tasks, issues, comments and documents.\n\n\
         The user sent a conversational message. Reply naturally.\n\
         If they greet you, greet them back.\n\
         If they ask what you can do, explain that you can:\n\
         - answer questions about their tasks and issues\n\
         - find tasks by status, priority or description\n\
         - summarize project activity\n\
         - search their organization's documents\n\n\
         Keep the reply to 2-4 friendly sentences.\n\n\
         User message: {}\n\n\
         Response:",
        question
    )
}

/// Prompt used when retrieval found nothing; carries no context block
pub fn no_hits_prompt(question: &str) -> String {
    format!(
        "You are an assistant for a task and issue management system.\n\
         The user asked a question, but no relevant tasks or issues were found in their data.\n\n\
         Write a short reply that:\n\
         1. Says no relevant data was found\n\
         2. Suggests what they could ask instead, specific to their question if possible\n\
         3. Reminds them you can help with tasks, issues and project data\n\n\
         Use 2-3 sentences. Be helpful, not apologetic.\n\n\
         User question: {}\n\n\
         Response:",
        question
    )
}

/// Prompt asking for a strict JSON verdict over document excerpts
pub fn verification_prompt(question: &str, excerpts: &str) -> String {
    format!(
        "You are a document verification assistant.\n\n\
         Use ONLY the provided context excerpts to answer the user's question. Do not use outside knowledge.\n\
         If the context does not contain enough evidence, say so.\n\n\
         Return STRICT JSON with this shape:\n\
         {{\n  \
           \"verdict\": \"verified\" | \"unverified\" | \"insufficient\",\n  \
           \"confidence\": number,\n  \
           \"answer\": string,\n  \
           \"citations\": [{{\"chunk_index\": number, \"reason\": string}}]\n\
         }}\n\n\
         Rules:\n\
         - \"confidence\" must be between 0 and 1.\n\
         - If you cannot support the answer from context, use verdict \"insufficient\".\n\n\
         User question:\n{}\n\n\
         Context excerpts:\n{}\n",
        question, excerpts
    )
}

/// Prompt asking for a strict JSON summary of a whole document
pub fn summary_prompt(document: &str) -> String {
    format!(
        "You are an AI assistant for document verification. Analyze the following document and provide a structured summary.\n\n\
         Return STRICT JSON with this shape:\n\
         {{\n  \
           \"summary\": string,\n  \
           \"key_points\": [string],\n  \
           \"document_type\": \"work_report\" | \"technical_doc\" | \"meeting_notes\" | \"proposal\" | \"other\",\n  \
           \"quality_assessment\": \"high\" | \"medium\" | \"low\",\n  \
           \"verification_recommendation\": \"approve\" | \"needs_review\" | \"reject\",\n  \
           \"notes\": string\n\
         }}\n\n\
         Rules:\n\
         - \"key_points\" holds 3 to 5 entries.\n\
         - Base every field on the document content only.\n\n\
         Document content:\n{}\n",
        document
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SourceType;
    use uuid::Uuid;

    fn hits() -> Vec<SimilarityHit> {
        vec![
            SimilarityHit::new(SourceType::Task, Uuid::nil(), "Task: Fix login".into(), 0.9),
            SimilarityHit::new(SourceType::Comment, Uuid::nil(), "Comment: done".into(), 0.5),
        ]
    }

    #[test]
    fn test_template_sections_in_order() {
        let prompt = PromptTemplate::new("Tester")
            .instruction("first")
            .instruction("second")
            .constraint("only one")
            .render("ctx", "why?");

        let positions: Vec<usize> = ["ROLE: Tester", "INSTRUCTIONS:", "2. second", "CONSTRAINTS:", "CONTEXT:\nctx", "QUERY: why?"]
            .iter()
            .map(|s| prompt.find(s).unwrap())
            .collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]));
        assert!(prompt.ends_with("RESPONSE:"));
    }

    #[test]
    fn test_template_without_constraints_omits_section() {
        let prompt = PromptTemplate::new("R").instruction("x").render("c", "q");
        assert!(!prompt.contains("CONSTRAINTS"));
    }

    #[test]
    fn test_contexts() {
        assert_eq!(template_context(&[]), NO_DOCUMENTS_PLACEHOLDER);
        assert_eq!(
            template_context(&hits()),
            "[task] Task: Fix login\n\n---\n\n[comment] Comment: done"
        );
        assert_eq!(
            direct_context(&hits()),
            "--- Document 1 [task] ---\nTask: Fix login\n\n--- Document 2 [comment] ---\nComment: done\n\n"
        );
    }

    #[test]
    fn test_grounded_prompts_carry_question_and_context() {
        for style in [PromptStyle::Template, PromptStyle::Direct] {
            let prompt = grounded_prompt(style, "what broke?", &hits());
            assert!(prompt.contains("what broke?"));
            assert!(prompt.contains("Task: Fix login"));
            assert!(prompt.contains("ONLY"));
        }
        assert!(grounded_prompt(PromptStyle::Direct, "q", &hits()).contains("STRICT RULES:"));
    }

    #[test]
    fn test_verification_prompt_is_strict_json() {
        let prompt = verification_prompt("is it done?", "[Chunk 0]\ntext");
        assert!(prompt.contains("\"verdict\": \"verified\" | \"unverified\" | \"insufficient\""));
        assert!(prompt.contains("[{\"chunk_index\": number, \"reason\": string}]"));
        assert!(prompt.contains("[Chunk 0]\ntext"));
    }

    #[test]
    fn test_summary_prompt_lists_allowed_values() {
        let prompt = summary_prompt("Sprint 12 report");
        assert!(prompt.contains("\"verification_recommendation\": \"approve\" | \"needs_review\" | \"reject\""));
        assert!(prompt.contains("\"key_points\": [string]"));
        assert!(prompt.ends_with("Document content:\nSprint 12 report\n"));
    }
}
