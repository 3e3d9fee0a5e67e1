use itertools::Itertools;
use url::Url;

use crate::AuthorizationEndpoint;
use crate::code_verifier::CodeChallenge;
use crate::csrf_token::CsrfToken;

/// Join scopes into the space separated form the authorize endpoint expects.
/// Blank entries are skipped.
pub(crate) fn join_scopes<S: AsRef<str>>(scopes: &[S]) -> String {
    scopes
        .iter()
        .map(|it| it.as_ref().trim())
        .filter(|it| !it.is_empty())
        .join(" ")
}

pub(crate) fn create_login_url(
    authorization_endpoint: AuthorizationEndpoint,
    code_challenge: &CodeChallenge,
    state: &CsrfToken,
    client_id: &str,
    redirect_uri: &Url,
    scope: &str,
) -> Url {
    let mut login_url: Url = authorization_endpoint;
    login_url
        .query_pairs_mut()
        .append_pair("response_type", "code")
        .append_pair("client_id", client_id)
        .append_pair("redirect_uri", redirect_uri.as_str())
        .append_pair(
            "code_challenge_method",
            code_challenge.code_challenge_method().as_str(),
        )
        .append_pair("code_challenge", code_challenge.code_challenge())
        .append_pair("state", state.as_str());
    if !scope.is_empty() {
        login_url.query_pairs_mut().append_pair("scope", scope);
    }
    login_url
}
