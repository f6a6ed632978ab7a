// Assistant conversation state: history, turn bookkeeping, request assembly.

use thiserror::Error;
use tracing::debug;

use finanzas_core::context::{FinancialContext, OwnershipError};
use finanzas_llm::prompt::assistant_system_prompt;
use finanzas_llm::protocol::{ChatMessage, ChatRole};

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("Error de seguridad: Los datos no pertenecen al usuario autenticado ({0})")]
    Ownership(#[from] OwnershipError),

    #[error("empty message")]
    EmptyMessage,

    #[error("a reply is already in progress")]
    Busy,
}

/// History of user and assistant messages. The system prompt is rebuilt for
/// every turn and never stored.
#[derive(Debug, Clone)]
pub struct ChatService {
    history: Vec<ChatMessage>,
    history_limit: usize,
    pending: bool,
}

impl ChatService {
    pub fn new(history_limit: usize) -> Self {
        ChatService {
            history: Vec::new(),
            history_limit: history_limit.max(1),
            pending: false,
        }
    }

    pub fn history(&self) -> &[ChatMessage] {
        &self.history
    }

    pub fn is_pending(&self) -> bool {
        self.pending
    }

    /// Record the user's question and return the messages to send: the
    /// system prompt followed by the most recent `history_limit` messages.
    pub fn begin_turn(
        &mut self,
        user_id: &str,
        context: &FinancialContext,
        question: &str,
    ) -> Result<Vec<ChatMessage>, ChatError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(ChatError::EmptyMessage);
        }
        if self.pending {
            return Err(ChatError::Busy);
        }
        context.verify_ownership(user_id)?;

        let context = context.clone().sanitized();
        let report = context.report();
        let system = assistant_system_prompt(&context, &report);

        self.history.push(ChatMessage::user(question));
        self.pending = true;

        let start = self.history.len().saturating_sub(self.history_limit);
        let mut messages = Vec::with_capacity(1 + self.history.len() - start);
        messages.push(ChatMessage::system(system));
        messages.extend_from_slice(&self.history[start..]);
        debug!(
            history = self.history.len(),
            sent = messages.len(),
            warning = report.warning.is_some(),
            "chat turn started"
        );
        Ok(messages)
    }

    pub fn finish_turn(&mut self, reply: &str) {
        self.history.push(ChatMessage::assistant(reply));
        self.pending = false;
    }

    /// Drop the pending question after a failed request so a retry does not
    /// send it twice. Returns the dropped text.
    pub fn abandon_turn(&mut self) -> Option<String> {
        if !self.pending {
            return None;
        }
        self.pending = false;
        match self.history.last() {
            Some(last) if last.role == ChatRole::User => self.history.pop().map(|m| m.content),
            _ => None,
        }
    }

    pub fn clear(&mut self) {
        self.history.clear();
        self.pending = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use finanzas_core::context::{ContextSettings, FinancialSnapshot};
    use finanzas_core::model::{Transaction, TransactionKind};

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 19).unwrap()
    }

    fn tx(id: &str, owner: &str, kind: TransactionKind, amount: f64) -> Transaction {
        Transaction {
            id: id.into(),
            user_id: Some(owner.into()),
            kind,
            amount,
            category: "Otros".into(),
            description: None,
            date: Some(today()),
            created_at: None,
        }
    }

    fn context(transactions: Vec<Transaction>) -> FinancialContext {
        FinancialContext::build(
            FinancialSnapshot {
                user_id: "u-1".into(),
                transactions,
                ..FinancialSnapshot::default()
            },
            today(),
            &ContextSettings::default(),
        )
    }

    #[test]
    fn request_is_system_plus_recent_history() {
        let ctx = context(vec![tx("1", "u-1", TransactionKind::Income, 1000.0)]);
        let mut chat = ChatService::new(3);
        for i in 0..3 {
            chat.begin_turn("u-1", &ctx, &format!("pregunta {i}")).unwrap();
            chat.finish_turn(&format!("respuesta {i}"));
        }
        let messages = chat.begin_turn("u-1", &ctx, "  última  ").unwrap();
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[0].role, ChatRole::System);
        assert!(messages[0].content.contains("$1.000"));
        assert_eq!(messages[3].content, "última");
        assert_eq!(messages[1].content, "pregunta 2");
        assert_eq!(chat.history().len(), 7);
    }

    #[test]
    fn abandon_drops_pending_question() {
        let ctx = context(Vec::new());
        let mut chat = ChatService::new(10);
        chat.begin_turn("u-1", &ctx, "hola").unwrap();
        assert!(chat.is_pending());
        assert!(matches!(chat.begin_turn("u-1", &ctx, "otra"), Err(ChatError::Busy)));

        assert_eq!(chat.abandon_turn().as_deref(), Some("hola"));
        assert!(chat.history().is_empty());
        assert!(chat.abandon_turn().is_none());
    }

    #[test]
    fn foreign_rows_are_refused_without_touching_history() {
        let ctx = context(vec![
            tx("1", "u-1", TransactionKind::Expense, 10.0),
            tx("2", "intruso", TransactionKind::Expense, 99.0),
        ]);
        let mut chat = ChatService::new(10);
        let err = chat.begin_turn("u-1", &ctx, "hola").unwrap_err();
        assert!(matches!(
            err,
            ChatError::Ownership(OwnershipError::ForeignTransactions { count: 1 })
        ));
        assert!(chat.history().is_empty());
        assert!(!chat.is_pending());

        assert!(matches!(
            chat.begin_turn("", &context(Vec::new()), "hola"),
            Err(ChatError::Ownership(OwnershipError::NotAuthenticated))
        ));
        assert!(matches!(chat.begin_turn("u-1", &ctx, "   "), Err(ChatError::EmptyMessage)));
    }

    #[test]
    fn clear_resets_everything() {
        let ctx = context(Vec::new());
        let mut chat = ChatService::new(10);
        chat.begin_turn("u-1", &ctx, "hola").unwrap();
        chat.clear();
        assert!(chat.history().is_empty());
        assert!(!chat.is_pending());
    }
}
