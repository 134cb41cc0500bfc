//! 📜 Эпизодическая память - история диалога с персоной
//!
//! Только для отображения в оболочке: в промпт уходит лишь последний
//! вопрос, прошлые реплики модель не видит.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// Одна реплика
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

/// Журнал реплик одной персоны; только дописывается, пока не очищен
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationLog {
    /// Идентификатор сессии, меняется при очистке
    pub session_id: Uuid,
    pub persona: String,
    messages: Vec<Message>,
}

impl ConversationLog {
    pub fn new(persona: &str) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            persona: persona.to_string(),
            messages: Vec::new(),
        }
    }

    pub fn push(&mut self, role: Role, content: &str) {
        self.messages.push(Message {
            role,
            content: content.to_string(),
            timestamp: Utc::now(),
        });
    }

    pub fn record_exchange(&mut self, question: &str, answer: &str) {
        self.push(Role::User, question);
        self.push(Role::Assistant, answer);
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Начинает новую сессию
    pub fn clear(&mut self) {
        self.messages.clear();
        self.session_id = Uuid::new_v4();
    }
}
