use axum::{
    async_trait,
    body::Bytes,
    extract::{FromRequest, FromRequestParts, Multipart, Request},
    http::request::Parts,
    response::{Html, IntoResponse, Redirect, Response},
};
use std::collections::HashMap;
use std::sync::Arc;
use tower_cookies::Cookies;

use crate::core::error::EservicesError;
use crate::core::shared::models::User;
use crate::core::shared::state::AppState;
use crate::security::csrf::ensure_token;
use crate::security::session::OptionalUser;
use crate::web::flash::{self, FlashLevel};
use crate::web::ui;

/// Everything a handler needs to render a page: the viewer, the cookie jar
/// for flashes and the CSRF token to embed in forms.
#[derive(Clone)]
pub struct PageContext {
    pub user: Option<User>,
    pub cookies: Cookies,
    pub csrf_token: String,
}

impl PageContext {
    pub fn csrf_input(&self) -> String {
        ui::csrf_input(&self.csrf_token)
    }

    pub fn flash(&self, level: FlashLevel, message: impl Into<String>) {
        flash::push(&self.cookies, level, message);
    }

    /// Flashes and redirects, the usual end of a POST handler.
    pub fn redirect_with(&self, level: FlashLevel, message: impl Into<String>, to: &str) -> Response {
        self.flash(level, message);
        Redirect::to(to).into_response()
    }

    /// Renders `body` inside the layout, draining pending flashes.
    pub fn render(&self, title: &str, body: &str) -> Html<String> {
        let flashes = flash::take(&self.cookies);
        Html(ui::document(title, self.user.as_ref(), &flashes, body))
    }
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for PageContext {
    type Rejection = Response;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let OptionalUser(user) = OptionalUser::from_request_parts(parts, state).await?;
        let cookies = Cookies::from_request_parts(parts, state)
            .await
            .map_err(|(_, msg)| EservicesError::Internal(msg.to_string()).into_response())?;
        let csrf_token = ensure_token(
            &cookies,
            &state.csrf,
            state.config.security.secure_cookies,
        );

        Ok(Self {
            user,
            cookies,
            csrf_token,
        })
    }
}

#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub field: String,
    pub filename: String,
    pub data: Bytes,
}

/// A fully buffered `multipart/form-data` body. File inputs left blank by
/// the browser (no filename) are dropped.
#[derive(Debug, Clone, Default)]
pub struct MultipartForm {
    pub fields: HashMap<String, String>,
    pub files: Vec<UploadedFile>,
}

impl MultipartForm {
    pub fn value(&self, name: &str) -> &str {
        self.fields.get(name).map(|v| v.as_str()).unwrap_or("")
    }

    pub fn file(&self, field: &str) -> Option<&UploadedFile> {
        self.files.iter().find(|f| f.field == field)
    }

    /// Checkbox semantics: present and not an explicit false.
    pub fn flag(&self, name: &str) -> bool {
        matches!(self.value(name), "y" | "on" | "true" | "1")
    }
}

#[async_trait]
impl FromRequest<Arc<AppState>> for MultipartForm {
    type Rejection = Response;

    async fn from_request(req: Request, state: &Arc<AppState>) -> Result<Self, Self::Rejection> {
        let mut multipart = Multipart::from_request(req, state)
            .await
            .map_err(IntoResponse::into_response)?;

        let mut form = MultipartForm::default();
        loop {
            let field = match multipart.next_field().await {
                Ok(Some(field)) => field,
                Ok(None) => break,
                Err(e) => {
                    return Err(EservicesError::Validation(format!("Malformed form data: {e}"))
                        .into_response())
                }
            };

            let Some(name) = field.name().map(str::to_string) else {
                continue;
            };

            match field.file_name().map(str::to_string) {
                Some(filename) => {
                    let data = field.bytes().await.map_err(|e| {
                        EservicesError::Validation(format!("Could not read upload: {e}"))
                            .into_response()
                    })?;
                    if !filename.is_empty() {
                        form.files.push(UploadedFile {
                            field: name,
                            filename,
                            data,
                        });
                    }
                }
                None => {
                    let text = field.text().await.map_err(|e| {
                        EservicesError::Validation(format!("Could not read field: {e}"))
                            .into_response()
                    })?;
                    form.fields.insert(name, text);
                }
            }
        }

        Ok(form)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_multipart_form_accessors() {
        let mut form = MultipartForm::default();
        form.fields.insert("is_internal".into(), "y".into());
        form.fields.insert("body".into(), "Hello".into());
        form.files.push(UploadedFile {
            field: "attachment".into(),
            filename: "a.pdf".into(),
            data: Bytes::from_static(b"%PDF"),
        });

        assert!(form.flag("is_internal"));
        assert!(!form.flag("missing"));
        assert_eq!(form.value("body"), "Hello");
        assert_eq!(form.value("status"), "");
        assert_eq!(form.file("attachment").map(|f| f.data.len()), Some(4));
        assert!(form.file("other").is_none());
    }
}
