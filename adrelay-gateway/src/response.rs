use serde::Serialize;

/// The envelope every track/callback response carries (spec.md §6):
/// `{"success": bool, "code": int, "message": string}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GatewayResponse {
    pub success: bool,
    pub code: u16,
    pub message: String,
}

impl GatewayResponse {
    #[must_use]
    pub fn ok() -> Self {
        Self {
            success: true,
            code: 200,
            message: "ok".to_owned(),
        }
    }

    #[must_use]
    pub fn new(success: bool, code: u16, message: impl Into<String>) -> Self {
        Self {
            success,
            code,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ok_response_is_200() {
        let r = GatewayResponse::ok();
        assert!(r.success);
        assert_eq!(r.code, 200);
    }

    #[test]
    fn new_response_carries_given_fields() {
        let r = GatewayResponse::new(false, 400, "missing ds_id");
        assert!(!r.success);
        assert_eq!(r.code, 400);
        assert_eq!(r.message, "missing ds_id");
    }
}
