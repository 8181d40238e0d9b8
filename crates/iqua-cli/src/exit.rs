use std::process::ExitCode;

use iqua_core::api::ApiError;

/// Process exit status, one code per failure category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exit {
    Ok,
    Config,
    Network,
    Payload,
    Http,
    Auth,
    Internal,
}

impl Exit {
    pub fn code(self) -> u8 {
        match self {
            Exit::Ok => 0,
            Exit::Config => 1,
            Exit::Network => 2,
            Exit::Payload => 3,
            Exit::Http => 4,
            Exit::Auth => 5,
            Exit::Internal => 70,
        }
    }

    pub fn for_api_error(err: &ApiError) -> Self {
        match err {
            ApiError::Auth { .. } => Exit::Auth,
            ApiError::Http { .. } => Exit::Http,
            ApiError::Network(_) => Exit::Network,
            ApiError::PayloadShape(_) => Exit::Payload,
        }
    }
}

impl From<Exit> for ExitCode {
    fn from(exit: Exit) -> Self {
        ExitCode::from(exit.code())
    }
}
