use thiserror::Error;

#[derive(Debug, Error)]
pub enum HubError {
    #[error("unreadable timestamp `{0}`")]
    Format(String),

    #[error("unrecognized value `{value}` for `{field}`")]
    InvalidPredicate { field: String, value: String },

    #[error("no such device: {0}")]
    InvalidDevice(i64),

    #[error("{0} timed out")]
    Timeout(&'static str),

    #[error("classification failed: {0}")]
    Classification(String),

    #[error("audit write failed: {0}")]
    AuditWrite(String),

    #[error("event store error: {0}")]
    Store(String),

    #[error("publish failed: {0}")]
    Publish(String),
}

impl HubError {
    pub fn invalid_predicate(field: &str, value: &str) -> Self {
        Self::InvalidPredicate {
            field: field.to_string(),
            value: value.to_string(),
        }
    }

    /// Short, user-facing reason. Collaborator errors are summarized rather
    /// than echoed so driver messages never reach the response topic.
    pub fn reason(&self) -> String {
        match self {
            Self::Format(_) => "a stored time could not be read".to_string(),
            Self::InvalidPredicate { field, value } => {
                format!("I don't know `{value}` as a {}", field.replace('_', " "))
            }
            Self::InvalidDevice(id) => format!("there is no light {id}"),
            Self::Timeout(what) => format!("the {what} took too long"),
            Self::Classification(_) => "I couldn't understand the command".to_string(),
            Self::AuditWrite(_) => "the action could not be logged".to_string(),
            Self::Store(_) => "the history database is unavailable".to_string(),
            Self::Publish(_) => "the command could not be sent to the device".to_string(),
        }
    }
}

pub type HubResult<T> = std::result::Result<T, HubError>;
