#[derive(thiserror::Error, Debug)]
pub enum SharedError {
    #[error("Invalid state transition: {from} -> {to}")]
    InvalidStateTransition { from: String, to: String },
}
