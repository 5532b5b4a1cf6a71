use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use warden_auth::Denial;
use warden_infra::AccountError;

pub fn denial_response(denial: Denial) -> axum::response::Response {
    let status = StatusCode::from_u16(denial.status()).unwrap_or(StatusCode::FORBIDDEN);
    json_error(status, denial.code(), denial.to_string())
}

pub fn account_error_response(err: AccountError) -> axum::response::Response {
    let status = match &err {
        AccountError::Arguments(_) => StatusCode::BAD_REQUEST,
        AccountError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
        AccountError::DataInvalid | AccountError::WrongCredentials => StatusCode::BAD_REQUEST,
        AccountError::NotFound => StatusCode::NOT_FOUND,
        AccountError::Unexpected => StatusCode::INTERNAL_SERVER_ERROR,
    };
    json_error(status, err.code(), err.to_string())
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use warden_core::ValidationError;

    #[test]
    fn denials_keep_their_status_class() {
        assert_eq!(denial_response(Denial::MissingCredential).status(), StatusCode::BAD_REQUEST);
        assert_eq!(denial_response(Denial::ExpiredCredential).status(), StatusCode::FORBIDDEN);
        assert_eq!(denial_response(Denial::InsufficientRights).status(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn account_errors_map_to_client_or_server_faults() {
        let xor = AccountError::Validation(ValidationError::FieldsRequired { group: vec![] });
        assert_eq!(account_error_response(xor).status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(
            account_error_response(AccountError::DataInvalid).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            account_error_response(AccountError::Unexpected).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
