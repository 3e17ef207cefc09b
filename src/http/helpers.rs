use axum::extract::Extension;

use crate::auth::RequestContext;
use crate::domain::Role;
use crate::error::AppError;

/// Shorthand used by every handler that needs the authenticated context.
pub type Ctx = Extension<RequestContext>;

pub fn require_role(ctx: &RequestContext, minimum: Role) -> Result<(), AppError> {
    if ctx.require_role(minimum) {
        Ok(())
    } else {
        Err(AppError::Authorization(format!(
            "requires role {minimum:?} or higher"
        )))
    }
}

/// Lowercase, hyphenated, alphanumeric-only slug.
pub fn slugify(input: &str) -> String {
    let mut slug = String::with_capacity(input.len());
    let mut last_was_hyphen = true;
    for ch in input.trim().chars() {
        if ch.is_ascii_alphanumeric() {
            slug.push(ch.to_ascii_lowercase());
            last_was_hyphen = false;
        } else if !last_was_hyphen {
            slug.push('-');
            last_was_hyphen = true;
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    slug
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugifies_spaces_and_punctuation() {
        assert_eq!(slugify("Acme Corp!"), "acme-corp");
        assert_eq!(slugify("  multi   space  "), "multi-space");
    }
}
