use std::fmt;

/// Urgency of a scheduled task. Ordering follows urgency, so
/// `UserBlocking > UserVisible > Background`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TaskPriority {
    Background,
    #[default]
    UserVisible,
    UserBlocking,
}

impl TaskPriority {
    /// Most urgent first.
    pub const ALL: [TaskPriority; 3] = [
        TaskPriority::UserBlocking,
        TaskPriority::UserVisible,
        TaskPriority::Background,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskPriority::UserBlocking => "user-blocking",
            TaskPriority::UserVisible => "user-visible",
            TaskPriority::Background => "background",
        }
    }

    /// Stable slot for per-priority queues, most urgent at 0.
    pub fn index(&self) -> usize {
        match self {
            TaskPriority::UserBlocking => 0,
            TaskPriority::UserVisible => 1,
            TaskPriority::Background => 2,
        }
    }
}

impl fmt::Display for TaskPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
