//! Request builders for the endpoints the core calls

use super::pagination::RequestRange;
use super::rest::ApiRequest;
use crate::auth::Scope;

pub mod timelines {
    use super::*;

    /// The logged-in account's home timeline.
    pub fn home(range: &RequestRange) -> ApiRequest {
        ApiRequest::get("api/v1/timelines/home").range(range)
    }

    /// The public timeline; `local` restricts it to this instance.
    pub fn public(local: bool, range: &RequestRange) -> ApiRequest {
        let request = ApiRequest::get("api/v1/timelines/public").range(range);
        if local {
            request.query("local", "true")
        } else {
            request
        }
    }
}

pub mod notifications {
    use super::*;

    pub fn all(range: &RequestRange) -> ApiRequest {
        ApiRequest::get("api/v1/notifications").range(range)
    }
}

pub mod instances {
    use super::*;

    /// Instance metadata; the bootstrap call resolving the canonical domain.
    pub fn current() -> ApiRequest {
        ApiRequest::get("api/v1/instance")
    }
}

pub mod accounts {
    use super::*;

    /// The account the credential belongs to.
    pub fn verify_credentials() -> ApiRequest {
        ApiRequest::get("api/v1/accounts/verify_credentials")
    }
}

pub mod apps {
    use super::*;

    /// Register a client application with the instance.
    pub fn register(client_name: &str, redirect_uri: &str, scopes: &[Scope]) -> ApiRequest {
        ApiRequest::post("api/v1/apps")
            .form("client_name", client_name)
            .form("redirect_uris", redirect_uri)
            .form("scopes", Scope::join(scopes))
    }
}

pub mod oauth {
    use super::*;

    /// Exchange an authorization code for an access token.
    pub fn token(
        client_id: &str,
        client_secret: &str,
        redirect_uri: &str,
        code: &str,
        scopes: &[Scope],
    ) -> ApiRequest {
        ApiRequest::post("oauth/token")
            .form("grant_type", "authorization_code")
            .form("client_id", client_id)
            .form("client_secret", client_secret)
            .form("redirect_uri", redirect_uri)
            .form("code", code)
            .form("scope", Scope::join(scopes))
    }
}
