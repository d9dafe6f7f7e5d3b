// Copyright 2021 Datafuse Labs.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

#![allow(non_snake_case)]

use std::fmt::Debug;
use std::fmt::Display;
use std::fmt::Formatter;
use std::sync::Arc;

use backtrace::Backtrace;

pub type Result<T> = std::result::Result<T, ErrorCode>;

#[derive(Clone)]
pub struct ErrorCodeBacktrace(Arc<Backtrace>);

impl ToString for ErrorCodeBacktrace {
    fn to_string(&self) -> String {
        format!("{:?}", self.0)
    }
}

/// The one error type that crosses every crate boundary in this workspace.
///
/// An `ErrorCode` carries a numeric code, a display text, an optional lower
/// level cause and the backtrace captured at construction.
pub struct ErrorCode {
    code: u16,
    display_text: String,
    cause: Option<Box<dyn std::error::Error + Sync + Send>>,
    backtrace: Option<ErrorCodeBacktrace>,
}

impl ErrorCode {
    pub fn code(&self) -> u16 {
        self.code
    }

    pub fn message(&self) -> String {
        self.cause
            .as_ref()
            .map(|cause| format!("{}\n{:?}", self.display_text, cause))
            .unwrap_or_else(|| self.display_text.clone())
    }

    pub fn add_message(self, msg: impl AsRef<str>) -> Self {
        Self {
            code: self.code,
            display_text: format!("{}\n{}", msg.as_ref(), self.display_text),
            cause: self.cause,
            backtrace: self.backtrace,
        }
    }

    pub fn add_message_back(self, msg: impl AsRef<str>) -> Self {
        Self {
            code: self.code,
            display_text: format!("{}{}", self.display_text, msg.as_ref()),
            cause: self.cause,
            backtrace: self.backtrace,
        }
    }

    pub fn backtrace_str(&self) -> String {
        self.backtrace
            .as_ref()
            .map_or_else(String::new, |x| x.to_string())
    }

    pub fn create(
        code: u16,
        display_text: String,
        cause: Option<Box<dyn std::error::Error + Sync + Send>>,
        backtrace: Option<ErrorCodeBacktrace>,
    ) -> ErrorCode {
        ErrorCode {
            code,
            display_text,
            cause,
            backtrace,
        }
    }
}

macro_rules! build_exceptions {
    ($($body:ident($code:expr)),*$(,)*) => {
        impl ErrorCode {
            $(
                pub fn $body(display_text: impl Into<String>) -> ErrorCode {
                    ErrorCode {
                        code: $code,
                        display_text: display_text.into(),
                        cause: None,
                        backtrace: Some(ErrorCodeBacktrace(Arc::new(Backtrace::new()))),
                    }
                }
            )*
        }
    }
}

build_exceptions! {
    Ok(0),
    UnknownException(1),
    BadBytes(2),
    InvalidConfig(3),
    Timeout(4),
    AbortedOperation(5),
    UnsupportedOperation(6),
    ConcurrentModification(7),
    NotCoordinator(8),
    GroupStoreDamaged(9),
    GroupLogError(10),
    Internal(11),
    BadArguments(12),
}

/// Adapt a foreign `Result` to `common_exception::Result` with a lazily built
/// context message.
pub trait ToErrorCode<T, E, CtxFn>
where E: Display + Send + Sync + 'static
{
    fn map_err_to_code<ErrFn, D>(self, make_exception: ErrFn, context_fn: CtxFn) -> Result<T>
    where
        ErrFn: FnOnce(String) -> ErrorCode,
        D: Display,
        CtxFn: FnOnce() -> D;
}

impl<T, E, CtxFn> ToErrorCode<T, E, CtxFn> for std::result::Result<T, E>
where E: Display + Send + Sync + 'static
{
    fn map_err_to_code<ErrFn, D>(self, make_exception: ErrFn, context_fn: CtxFn) -> Result<T>
    where
        ErrFn: FnOnce(String) -> ErrorCode,
        D: Display,
        CtxFn: FnOnce() -> D,
    {
        self.map_err(|error| {
            let err_text = format!("{}, cause: {}", context_fn(), error);
            make_exception(err_text)
        })
    }
}

impl ErrorCode {
    pub fn from_std_error<T: std::error::Error>(error: T) -> Self {
        ErrorCode {
            code: 1,
            display_text: error.to_string(),
            cause: None,
            backtrace: Some(ErrorCodeBacktrace(Arc::new(Backtrace::new()))),
        }
    }
}

impl From<std::io::Error> for ErrorCode {
    fn from(error: std::io::Error) -> Self {
        ErrorCode::from_std_error(error)
    }
}

impl From<serde_json::Error> for ErrorCode {
    fn from(error: serde_json::Error) -> Self {
        ErrorCode::BadBytes(format!("json se/de error: {}", error))
    }
}

impl From<std::string::FromUtf8Error> for ErrorCode {
    fn from(error: std::string::FromUtf8Error) -> Self {
        ErrorCode::BadBytes(format!("bad utf8 bytes: {}", error))
    }
}

impl From<anyhow::Error> for ErrorCode {
    fn from(error: anyhow::Error) -> Self {
        ErrorCode {
            code: 1,
            display_text: format!("{}, source: {:?}", error, error.source()),
            cause: None,
            backtrace: Some(ErrorCodeBacktrace(Arc::new(Backtrace::new()))),
        }
    }
}

impl Display for ErrorCode {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Code: {}, displayText = {}.", self.code(), self.message())
    }
}

impl Debug for ErrorCode {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Code: {}, displayText = {}.",
            self.code(),
            self.message()
        )?;

        match self.backtrace.as_ref() {
            None => Ok(()),
            Some(backtrace) => write!(f, "\n\n{}", backtrace.to_string()),
        }
    }
}

impl std::error::Error for ErrorCode {}
