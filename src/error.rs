// src/error.rs

use std::fmt;
use thiserror::Error;

/// Категория ошибки. Сохраняется при любом оборачивании,
/// накапливается только текст сообщения.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Internal,
    BadRequest,
    NotFound,
    Forbidden,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::Internal => "internal",
            ErrorKind::BadRequest => "bad_request",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Forbidden => "forbidden",
        };
        write!(f, "{s}")
    }
}

/// Ошибка слоя контактов: вид + сообщение с цепочкой контекстов
/// вида `"service.update_contact: cache.get_contact: ..."`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ContactError {
    pub kind: ErrorKind,
    pub message: String,
}

pub type Result<T, E = ContactError> = std::result::Result<T, E>;

impl ContactError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into() }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::BadRequest, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Forbidden, message)
    }

    /// Добавляет контекст операции, вид ошибки не меняется.
    pub fn wrap(self, context: impl fmt::Display) -> Self {
        Self {
            kind: self.kind,
            message: format!("{context}: {}", self.message),
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.kind == ErrorKind::NotFound
    }
}

/// Удобный `.context("...")` для `Result<T, ContactError>`.
pub trait ResultExt<T> {
    fn context(self, context: &str) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: &str) -> Result<T> {
        self.map_err(|e| e.wrap(context))
    }
}
