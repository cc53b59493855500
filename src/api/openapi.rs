use super::handlers::{admins, audit, auth, health, reports, stats, users};
use utoipa::openapi::{Contact, InfoBuilder, License, OpenApiBuilder, Tag};
use utoipa_axum::{router::OpenApiRouter, routes};

#[must_use]
pub fn openapi() -> utoipa::openapi::OpenApi {
    let (_router, openapi) = api_router().split_for_parts();
    openapi
}

/// Build the router that also drives the `OpenAPI` document.
///
/// Handlers sharing a path go in the same `routes!` call.
pub(crate) fn api_router() -> OpenApiRouter {
    let mut router = OpenApiRouter::with_openapi(cargo_openapi())
        .routes(routes!(health::health))
        .routes(routes!(auth::login))
        .routes(routes!(auth::logout))
        .routes(routes!(auth::session))
        .routes(routes!(auth::change_password))
        .routes(routes!(admins::list_admins, admins::create_admin))
        .routes(routes!(admins::activate_admin))
        .routes(routes!(admins::deactivate_admin))
        .routes(routes!(admins::promote_admin))
        .routes(routes!(admins::demote_admin))
        .routes(routes!(users::list_users))
        .routes(routes!(users::bulk_block))
        .routes(routes!(users::block_user))
        .routes(routes!(users::unblock_user))
        .routes(routes!(users::delete_user))
        .routes(routes!(stats::stats))
        .routes(routes!(reports::list_reports))
        .routes(routes!(reports::resolve_report))
        .routes(routes!(audit::audit_trail));

    router.get_openapi_mut().tags = Some(vec![
        tag("warden", "Admin authentication and moderation API"),
        tag("health", "Liveness and build information"),
        tag("auth", "Login, logout, session and password"),
        tag("admins", "Admin accounts (super admin only)"),
        tag("users", "Chat directory moderation"),
        tag("reports", "Abuse report review"),
        tag("audit", "Audit trail (super admin only)"),
    ]);

    router
}

fn tag(name: &str, description: &str) -> Tag {
    let mut tag = Tag::new(name);
    tag.description = Some(description.to_string());
    tag
}

fn cargo_openapi() -> utoipa::openapi::OpenApi {
    let mut info = InfoBuilder::new()
        .title(env!("CARGO_PKG_NAME"))
        .version(env!("CARGO_PKG_VERSION"))
        .description(optional_str(env!("CARGO_PKG_DESCRIPTION")))
        .build();

    info.contact = cargo_contact();
    info.license = cargo_license();

    OpenApiBuilder::new().info(info).build()
}

fn cargo_contact() -> Option<Contact> {
    // Cargo authors are `;` separated and may include "Name <email>".
    let primary = env!("CARGO_PKG_AUTHORS").split(';').next().map(str::trim)?;
    let (name, email) = parse_author(primary);
    if name.is_none() && email.is_none() {
        return None;
    }

    let mut contact = Contact::new();
    contact.name = name.map(str::to_string);
    contact.email = email.map(str::to_string);
    Some(contact)
}

fn cargo_license() -> Option<License> {
    let identifier = optional_str(env!("CARGO_PKG_LICENSE"))?;
    let mut license = License::new(identifier);
    license.identifier = Some(identifier.to_string());
    Some(license)
}

fn optional_str(value: &'static str) -> Option<&'static str> {
    Some(value.trim()).filter(|trimmed| !trimmed.is_empty())
}

fn non_empty(value: &str) -> Option<&str> {
    Some(value.trim()).filter(|trimmed| !trimmed.is_empty())
}

fn parse_author(author: &str) -> (Option<&str>, Option<&str>) {
    match author.split_once('<') {
        Some((name, email)) => (non_empty(name), non_empty(email.trim_end_matches('>'))),
        None => (non_empty(author), None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openapi_info_from_cargo() {
        let doc = openapi();
        assert_eq!(doc.info.title, env!("CARGO_PKG_NAME"));
        assert_eq!(doc.info.version, env!("CARGO_PKG_VERSION"));

        let contact = doc.info.contact;
        assert!(contact.is_some());
        if let Some(contact) = contact {
            assert_eq!(contact.name.as_deref(), Some("Team Warden"));
            assert_eq!(contact.email.as_deref(), Some("team@warden.dev"));
        }

        let license = doc.info.license;
        assert!(license.is_some());
        if let Some(license) = license {
            assert_eq!(license.identifier.as_deref(), Some("BSD-3-Clause"));
        }
    }

    #[test]
    fn every_route_is_documented() {
        let doc = openapi();
        for path in [
            "/health",
            "/v1/auth/login",
            "/v1/auth/logout",
            "/v1/auth/session",
            "/v1/auth/password",
            "/v1/admins",
            "/v1/admins/{id}/activate",
            "/v1/admins/{id}/deactivate",
            "/v1/admins/{id}/promote",
            "/v1/admins/{id}/demote",
            "/v1/users",
            "/v1/users/block",
            "/v1/users/{id}",
            "/v1/users/{id}/block",
            "/v1/users/{id}/unblock",
            "/v1/stats",
            "/v1/reports",
            "/v1/reports/{id}/resolve",
            "/v1/audit",
        ] {
            assert!(doc.paths.paths.contains_key(path), "missing {path}");
        }

        let tags = doc.tags.unwrap_or_default();
        assert!(tags.iter().any(|tag| tag.name == "admins"));
        assert!(tags.iter().any(|tag| tag.name == "audit"));
    }

    #[test]
    fn parse_author_variants() {
        assert_eq!(
            parse_author("Jane Doe <jane@x.dev>"),
            (Some("Jane Doe"), Some("jane@x.dev"))
        );
        assert_eq!(parse_author("<ops@x.dev>"), (None, Some("ops@x.dev")));
        assert_eq!(parse_author("Solo"), (Some("Solo"), None));
        assert_eq!(parse_author("  "), (None, None));
    }
}
