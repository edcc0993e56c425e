//! Prompt assembly
//!
//! Turns a roadmap snapshot, the recent transcript and the new utterance into
//! the ordered message list sent to the model. The instruction block is the
//! only place where the removal confirmation policy exists; nothing else in
//! the engine enforces it.

use sdk::types::{Author, CorrelationId, HistoryEntry, RoadmapSnapshot};
use tracing::debug;

use crate::llm::Message;

const TASK: &str = "\
You help the user edit the roadmap shown above. Read the user's latest message \
together with the conversation so far and identify the edits they want: renamed, \
added, reordered, rewritten or removed steps, and changes to the roadmap name or \
description. When the intent is unclear or incomplete, ask one short clarifying \
question instead of guessing.";

const CONTRACT: &str = "\
Answer with a single JSON object and nothing else. It has exactly three keys:
- \"isAsking\": boolean.
- \"roadmap\": null, or an object {\"name\": string, \"description\": string, \
\"steps\": [{\"name\": string, \"description\": string}, ...]}.
- \"question\": null, or a non-empty string.
When \"isAsking\" is true, \"question\" holds your question and \"roadmap\" is null.
When \"isAsking\" is false, \"roadmap\" holds the complete updated roadmap with every \
step that should remain, in order, and \"question\" is null.
Step names are never empty.";

const CONFIRMATION: &str = "\
Removing a step is destructive. If the user's message implies that one or more steps \
should be removed, first ask an explicit yes/no question naming those steps. Only \
return a roadmap without them after the user has confirmed in a later message.";

/// Builds the message list for one negotiation turn
#[derive(Debug, Default, Clone, Copy)]
pub struct PromptBuilder;

impl PromptBuilder {
    pub fn new() -> Self {
        Self
    }

    /// Instruction message, then `history` in order, then `utterance`
    ///
    /// The correlation id only tags the log line; it is never sent to the model.
    pub fn build(
        &self,
        correlation_id: &CorrelationId,
        roadmap: &RoadmapSnapshot,
        history: &[HistoryEntry],
        utterance: &str,
    ) -> Vec<Message> {
        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(Message::system(self.instructions(roadmap)));

        messages.extend(history.iter().map(|entry| match entry.author {
            Author::User => Message::user(entry.text.clone()),
            Author::Assistant => Message::assistant(entry.text.clone()),
        }));

        messages.push(Message::user(utterance));

        debug!(
            correlation_id = %correlation_id,
            history_turns = history.len(),
            total_chars = messages.iter().map(|m| m.content.len()).sum::<usize>(),
            "Built negotiation prompt"
        );

        messages
    }

    fn instructions(&self, roadmap: &RoadmapSnapshot) -> String {
        // Serializing a struct of strings cannot fail
        let snapshot = serde_json::to_string_pretty(roadmap).unwrap_or_default();

        format!(
            "Current roadmap:\n{}\n\n# Task\n{}\n\n# Output format\n{}\n\n# Confirmation\n{}",
            snapshot, TASK, CONTRACT, CONFIRMATION
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MessageRole;
    use sdk::types::StepDraft;

    fn roadmap() -> RoadmapSnapshot {
        RoadmapSnapshot {
            name: "Demenagement".to_string(),
            description: "Move to Lyon".to_string(),
            steps: vec![
                StepDraft::new("Find flat", "Visit listings"),
                StepDraft::new("Pack", "Boxes and tape"),
            ],
        }
    }

    fn entry(turn_index: i64, author: Author, text: &str) -> HistoryEntry {
        HistoryEntry {
            turn_index,
            author,
            text: text.to_string(),
            created_at: 0,
        }
    }

    #[test]
    fn test_message_order() {
        let history = vec![
            entry(0, Author::User, "rename pack"),
            entry(1, Author::Assistant, "{\"isAsking\":true}"),
        ];

        let messages = PromptBuilder::new().build(
            &CorrelationId::for_roadmap(1),
            &roadmap(),
            &history,
            "call it Packing",
        );

        assert_eq!(messages.len(), 4);
        assert_eq!(messages[0].role, MessageRole::System);
        assert_eq!(messages[1].role, MessageRole::User);
        assert_eq!(messages[1].content, "rename pack");
        assert_eq!(messages[2].role, MessageRole::Assistant);
        assert_eq!(messages[3].role, MessageRole::User);
        assert_eq!(messages[3].content, "call it Packing");
    }

    #[test]
    fn test_instructions_embed_snapshot_and_contract() {
        let snapshot = roadmap();
        let messages =
            PromptBuilder::new().build(&CorrelationId::for_roadmap(1), &snapshot, &[], "hi");

        let system = &messages[0].content;
        assert!(system.contains(&serde_json::to_string_pretty(&snapshot).unwrap()));
        assert!(system.contains("\"isAsking\""));
        assert!(system.contains("\"question\""));
        assert!(system.contains("yes/no"));
        assert!(!system.contains("roadmap:1"));
    }
}
