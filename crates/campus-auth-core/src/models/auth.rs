use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use super::{Profile, Role};

/// An opaque token string.
///
/// `Debug` is redacted so credentials never end up in logs.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Credential(String);

impl Credential {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `Authorization` header value
    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.0)
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Credential(<{} chars>)", self.0.len())
    }
}

impl From<String> for Credential {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Standard `{ success, data }` wrapper used by most endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct Envelope<T> {
    #[serde(default)]
    pub success: Option<bool>,
    pub data: T,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoginRequest<'a> {
    pub email: &'a str,
    pub password: &'a str,
}

/// `data` of a successful `POST /auth/login`.
#[derive(Debug, Clone, Deserialize)]
pub struct LoginResponse {
    #[serde(rename = "accessToken")]
    pub access_token: Credential,
    #[serde(rename = "refreshToken")]
    pub refresh_token: Credential,
    /// Reduced profile, only used when `/users/me` fails. A missing or
    /// unreadable user does not fail the sign-in.
    #[serde(default, deserialize_with = "lenient_profile")]
    pub user: Option<Profile>,
}

fn lenient_profile<'de, D>(deserializer: D) -> Result<Option<Profile>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| serde_json::from_value(v).ok()))
}

#[derive(Debug, Clone, Serialize)]
pub struct RefreshRequest<'a> {
    #[serde(rename = "refreshToken")]
    pub refresh_token: &'a str,
}

/// `POST /auth/refresh` answers at the top level rather than inside `data`.
#[derive(Debug, Clone, Deserialize)]
pub struct RefreshResponse {
    #[serde(default = "default_success")]
    pub success: bool,
    #[serde(rename = "accessToken")]
    pub access_token: Option<Credential>,
}

fn default_success() -> bool {
    true
}

/// Body of `POST /auth/register`.
#[derive(Debug, Clone, Serialize)]
pub struct RegistrationRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    pub role: Role,
    pub department_id: Option<String>,
    /// Only sent for students
    #[serde(skip_serializing_if = "Option::is_none")]
    pub student_number: Option<String>,
}

impl RegistrationRequest {
    pub fn new(name: &str, email: &str, password: &str, role: Role) -> Self {
        Self {
            name: name.to_string(),
            email: email.to_string(),
            password: password.to_string(),
            role,
            department_id: None,
            student_number: None,
        }
    }

    pub fn department(mut self, department_id: &str) -> Self {
        self.department_id = Some(department_id.to_string());
        self
    }

    /// Ignored unless the role is `Student`.
    pub fn student_number(mut self, number: &str) -> Self {
        if self.role == Role::Student {
            self.student_number = Some(number.to_string());
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_credential_debug_is_redacted() {
        let credential = Credential::new("secret-token");
        let printed = format!("{:?}", credential);
        assert!(!printed.contains("secret"));
        assert_eq!(credential.bearer(), "Bearer secret-token");
    }

    #[test]
    fn test_parse_login_envelope() {
        let json = r#"{"success": true, "data": {"accessToken": "a1", "refreshToken": "r1", "user": {"id": 1, "name": "Ada"}}}"#;
        let parsed: Envelope<LoginResponse> =
            serde_json::from_str(json).expect("Failed to parse login JSON");

        assert_eq!(parsed.data.access_token.as_str(), "a1");
        assert_eq!(parsed.data.refresh_token.as_str(), "r1");
        assert_eq!(
            parsed.data.user.and_then(|u| u.name).as_deref(),
            Some("Ada")
        );
    }

    #[test]
    fn test_login_without_usable_user() {
        let missing: LoginResponse =
            serde_json::from_str(r#"{"accessToken": "a1", "refreshToken": "r1"}"#).unwrap();
        assert!(missing.user.is_none());

        let no_id: LoginResponse = serde_json::from_str(
            r#"{"accessToken": "a1", "refreshToken": "r1", "user": {"name": "Ada"}}"#,
        )
        .unwrap();
        assert!(no_id.user.is_none());
        assert_eq!(no_id.access_token.as_str(), "a1");
    }

    #[test]
    fn test_parse_refresh_response() {
        let ok: RefreshResponse = serde_json::from_str(r#"{"accessToken": "a2"}"#).unwrap();
        assert!(ok.success);
        assert_eq!(ok.access_token.map(|c| c.as_str().to_string()).as_deref(), Some("a2"));

        let rejected: RefreshResponse = serde_json::from_str(r#"{"success": false}"#).unwrap();
        assert!(!rejected.success);
        assert!(rejected.access_token.is_none());
    }

    #[test]
    fn test_registration_student_number_only_for_students() {
        let student = RegistrationRequest::new("Ada", "ada@x.edu", "pw", Role::Student)
            .department("3")
            .student_number("2024001");
        let faculty = RegistrationRequest::new("Bob", "bob@x.edu", "pw", Role::Faculty)
            .student_number("ignored");

        let student_json = serde_json::to_value(&student).unwrap();
        assert_eq!(student_json["role"], json!("student"));
        assert_eq!(student_json["student_number"], json!("2024001"));

        let faculty_json = serde_json::to_value(&faculty).unwrap();
        assert!(faculty_json.get("student_number").is_none());
        assert_eq!(faculty_json["department_id"], json!(null));
    }
}
