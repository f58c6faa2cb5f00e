//! Conversational intent classification
//!
//! Three phrase families, each matched differently over the trimmed,
//! lower-cased question:
//! - greetings: the whole question, or a prefix followed by a space or
//!   punctuation, so "hi" matches "hi there" but not "history". Besides
//!   space, `!` and `,` a greeting may also end in `.` or `?`, which is
//!   wider than a bare prefix rule ("Good morning." and "sup?" count)
//! - questions about the assistant: substring
//! - thanks: substring

const GREETINGS: &[&str] = &[
    "hello",
    "hi",
    "hey",
    "good morning",
    "good afternoon",
    "good evening",
    "howdy",
    "greetings",
    "what's up",
    "whats up",
    "sup",
];

const ABOUT_ASSISTANT: &[&str] = &[
    "who are you",
    "what are you",
    "what can you do",
    "how do i use you",
    "how to use you",
    "help",
    "what is this",
    "how does this work",
    "what can i ask",
    "what should i ask",
    "give me examples",
    "how can you help",
    "what do you do",
    "introduce yourself",
    "tell me about yourself",
    "your capabilities",
    "your features",
];

// "ty" is left out: as a substring it matches "priority", "city", "empty"
const THANKS: &[&str] = &["thank you", "thanks", "thx", "appreciate"];

const GREETING_TERMINATORS: &[char] = &[' ', '!', ',', '.', '?'];

fn is_greeting(q: &str) -> bool {
    GREETINGS.iter().any(|g| {
        q == *g
            || q
                .strip_prefix(g)
                .and_then(|rest| rest.chars().next())
                .is_some_and(|c| GREETING_TERMINATORS.contains(&c))
    })
}

/// Whether the question is small talk rather than a request for data
pub fn is_conversational(question: &str) -> bool {
    let q = question.trim().to_lowercase();
    if q.is_empty() {
        return false;
    }

    is_greeting(&q)
        || ABOUT_ASSISTANT.iter().any(|p| q.contains(p))
        || THANKS.iter().any(|p| q.contains(p))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_greetings() {
        for q in ["hello", "Hi", "  hey!  ", "hi, can we talk", "Good morning.", "sup?", "what's up"] {
            assert!(is_conversational(q), "{q}");
        }
    }

    #[test]
    fn test_greeting_needs_full_token() {
        for q in ["history of the login task", "heyday planning", "superb issues", "hello_world task status"] {
            assert!(!is_conversational(q), "{q}");
        }
    }

    #[test]
    fn test_about_assistant_is_substring() {
        assert!(is_conversational("So, what can you do for me"));
        assert!(is_conversational("I need help"));
        // substring match is deliberate: "helpdesk" counts
        assert!(is_conversational("open helpdesk tickets"));
    }

    #[test]
    fn test_thanks() {
        assert!(is_conversational("ok thanks a lot"));
        assert!(is_conversational("Thank you!"));
        assert!(!is_conversational("which tasks have high priority?"));
    }

    #[test]
    fn test_data_questions() {
        for q in ["what tasks are overdue?", "show issues assigned to me", "", "   "] {
            assert!(!is_conversational(q), "{q}");
        }
    }
}
