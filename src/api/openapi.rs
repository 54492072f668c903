use super::handlers::{auth, classes, health, me, programs, users};
use utoipa::openapi::{Contact, InfoBuilder, License, OpenApiBuilder, Tag};
use utoipa_axum::{router::OpenApiRouter, routes};

#[must_use]
pub fn openapi() -> utoipa::openapi::OpenApi {
    // Reuse the same router wiring and only return the generated OpenAPI spec.
    let (_router, openapi) = api_router().split_for_parts();
    openapi
}

/// Build the router that also drives the `OpenAPI` document.
///
/// Add new endpoints here via `.routes(routes!(...))` so they are both served
/// and included in the generated `OpenAPI` spec.
/// Routes added outside (like `/` or `OPTIONS /health`) are intentionally not documented.
pub(crate) fn api_router() -> OpenApiRouter {
    // `routes!` reads #[utoipa::path] to bind HTTP method + path and add the route to OpenAPI.
    OpenApiRouter::with_openapi(cargo_openapi())
        .routes(routes!(health::health))
        .routes(routes!(auth::authenticate::login))
        .routes(routes!(auth::session::session, auth::session::update_session))
        .routes(routes!(auth::session::logout))
        .routes(routes!(auth::switch_role::validate_switch))
        .routes(routes!(me::get_me))
        .routes(routes!(me::change_password))
        .routes(routes!(users::list_users, users::create_user))
        .routes(routes!(
            users::get_user,
            users::patch_user,
            users::delete_user
        ))
        .routes(routes!(classes::list_classes, classes::create_class))
        .routes(routes!(
            classes::get_class,
            classes::patch_class,
            classes::delete_class
        ))
        .routes(routes!(classes::add_member))
        .routes(routes!(classes::remove_member))
        .routes(routes!(classes::assign_teacher))
        .routes(routes!(
            classes::list_class_sessions,
            classes::create_class_session
        ))
        .routes(routes!(classes::delete_class_session))
        .routes(routes!(programs::list_programs, programs::create_program))
        .routes(routes!(programs::patch_program, programs::delete_program))
}

fn cargo_openapi() -> utoipa::openapi::OpenApi {
    // Use Cargo.toml metadata instead of the utoipa-axum crate info defaults.
    let mut info = InfoBuilder::new()
        .title(env!("CARGO_PKG_NAME"))
        .version(env!("CARGO_PKG_VERSION"))
        .description(optional_str(env!("CARGO_PKG_DESCRIPTION")))
        .build();

    info.contact = cargo_contact();
    info.license = cargo_license();

    let mut portal_tag = Tag::new("lernejo");
    portal_tag.description = Some("Coaching academy portal API".to_string());

    let mut auth_tag = Tag::new("auth");
    auth_tag.description = Some("Login, sessions, and role switching".to_string());

    OpenApiBuilder::new()
        .info(info)
        .tags(Some(vec![portal_tag, auth_tag]))
        .build()
}

fn cargo_contact() -> Option<Contact> {
    // Cargo authors are `;` separated and may include "Name <email>".
    let authors = env!("CARGO_PKG_AUTHORS");
    let primary = authors.split(';').next().map(str::trim)?;
    if primary.is_empty() {
        return None;
    }

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
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed)
    }
}

fn parse_author(author: &str) -> (Option<&str>, Option<&str>) {
    if let Some(start) = author.find('<') {
        let name = author[..start].trim();
        let email = author[start + 1..].trim_end_matches('>').trim();
        let name = if name.is_empty() { None } else { Some(name) };
        let email = if email.is_empty() { None } else { Some(email) };
        (name, email)
    } else {
        let name = author.trim();
        (if name.is_empty() { None } else { Some(name) }, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openapi_carries_cargo_metadata() {
        let spec = openapi();
        assert_eq!(spec.info.title, env!("CARGO_PKG_NAME"));
        assert_eq!(spec.info.version, env!("CARGO_PKG_VERSION"));
    }

    #[test]
    fn openapi_registers_core_routes() {
        let spec = openapi();
        let paths = &spec.paths.paths;
        for path in [
            "/health",
            "/v1/auth/login",
            "/v1/auth/session",
            "/v1/auth/role",
            "/v1/auth/logout",
            "/v1/me",
            "/v1/users",
            "/v1/users/{id}",
            "/v1/classes",
            "/v1/classes/{id}",
            "/v1/classes/{id}/members",
            "/v1/classes/{id}/sessions",
            "/v1/programs",
        ] {
            assert!(paths.contains_key(path), "missing path {path}");
        }
    }

    #[test]
    fn parse_author_variants() {
        assert_eq!(
            parse_author("Team Lernejo <team@lernejo.dev>"),
            (Some("Team Lernejo"), Some("team@lernejo.dev"))
        );
        assert_eq!(parse_author("Solo Author"), (Some("Solo Author"), None));
        assert_eq!(parse_author("<only@email>"), (None, Some("only@email")));
    }
}
