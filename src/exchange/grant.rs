// self
use crate::_prelude::*;

/// Grant discriminators accepted by the registry's token endpoints.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenGrant {
	/// Identity token exchanged for a registry refresh token.
	AccessToken,
	/// Registry refresh token exchanged for an access token.
	RefreshToken,
	/// Anonymous access token request carrying an empty refresh token.
	Password,
}
impl TokenGrant {
	/// Returns the `grant_type` form value.
	pub fn as_str(self) -> &'static str {
		match self {
			TokenGrant::AccessToken => "access_token",
			TokenGrant::RefreshToken => "refresh_token",
			TokenGrant::Password => "password",
		}
	}
}
impl Display for TokenGrant {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}
