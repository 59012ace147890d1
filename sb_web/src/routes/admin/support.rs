//! ABOUTME: Admin sections for visitor feedback triage and stored email templates
//! ABOUTME: Templates can be previewed with sample values and sent as a test message

use super::{cell, guard, register, AdminCtx, AdminResource, FormData};
use crate::{
    csrf::CSRF_FIELD,
    error::{PageError, PageResult},
    middleware::auth::AuthUser,
    routes::require_csrf,
    views::{render, same_options, AdminRow, EmailPreviewPage, FormField, Layout},
    AppState,
};
use actix_web::web;
use async_trait::async_trait;
use sb_core::{Error, Result};
use sb_db::{
    EmailTemplate, EmailTemplateRepository, EmailTemplateRequest, FeedbackRepository, PageRequest,
    FEEDBACK_STATUSES,
};
use sb_notify::render_template;
use std::collections::HashMap;
use tracing::{info, warn};

const SUMMARY_CHARS: usize = 80;

fn summary(text: &str) -> String {
    let mut out: String = text.chars().take(SUMMARY_CHARS).collect();
    if text.chars().count() > SUMMARY_CHARS {
        out.push_str("...");
    }
    out
}

// ---------------------------------------------------------------------------
// Feedback

pub(crate) struct FeedbackSection;

#[async_trait(?Send)]
impl AdminResource for FeedbackSection {
    const SECTION: &'static str = "feedback";
    const TITLE: &'static str = "Feedback";
    const SINGULAR: &'static str = "feedback";
    const CREATABLE: bool = false;

    fn headers() -> Vec<&'static str> {
        vec!["Type", "Description", "From", "Status", "Received"]
    }

    fn statuses() -> Vec<&'static str> {
        FEEDBACK_STATUSES.to_vec()
    }

    async fn list(
        ctx: &AdminCtx<'_>,
        q: &Option<String>,
        status: &Option<String>,
        page: PageRequest,
    ) -> Result<(Vec<AdminRow>, i64)> {
        let repo = FeedbackRepository::new(ctx.pool());
        let rows = repo
            .list(q, status, page)
            .await?
            .into_iter()
            .map(|f| AdminRow {
                cells: vec![
                    f.feedback_type.clone(),
                    summary(&f.description),
                    f.email.clone().or_else(|| f.name.clone()).unwrap_or_default(),
                    f.status.clone(),
                    f.created_at.chars().take(16).collect(),
                ],
                id: f.id,
            })
            .collect();
        Ok((rows, repo.count(q, status).await?))
    }

    async fn fields(ctx: &AdminCtx<'_>, id: Option<&str>) -> Result<Option<Vec<FormField>>> {
        // feedback only arrives from visitors
        let Some(id) = id else {
            return Ok(None);
        };
        let Some(f) = FeedbackRepository::new(ctx.pool()).find_by_id(id).await? else {
            return Ok(None);
        };

        let readonly = |name, label, value: String| FormField::new(name, label, "readonly").value(value);
        Ok(Some(vec![
            readonly("feedback_type", "Type", f.feedback_type.clone()),
            readonly("description", "Description", f.description.clone()),
            readonly("suggestion", "Suggestion", cell(&f.suggestion)),
            readonly("name", "Name", cell(&f.name)),
            readonly("email", "Email", cell(&f.email)),
            readonly("page_url", "Page", cell(&f.page_url)),
            readonly("user_agent", "Browser", cell(&f.user_agent)),
            readonly("screen_size", "Screen", cell(&f.screen_size)),
            readonly(
                "is_authenticated",
                "Signed in",
                if f.is_authenticated { "yes" } else { "no" }.to_string(),
            ),
            readonly("received", "Received", f.created_at.clone()),
            readonly("processed_at", "Processed", cell(&f.processed_at)),
            FormField::text("status", "Status")
                .options(same_options(FEEDBACK_STATUSES))
                .value(f.status.clone())
                .required(),
            FormField::new("admin_notes", "Notes", "textarea").value_opt(&f.admin_notes),
        ]))
    }

    async fn create(_ctx: &AdminCtx<'_>, _form: &FormData) -> Result<String> {
        Err(Error::Validation("Feedback cannot be created here".to_string()))
    }

    async fn update(ctx: &AdminCtx<'_>, id: &str, form: &FormData) -> Result<()> {
        let notes = form.opt("admin_notes");
        let status = form.required("status", "Status")?;
        FeedbackRepository::new(ctx.pool())
            .update_status(id, &status, notes.as_deref(), &ctx.actor.id)
            .await?;
        info!(feedback_id = %id, status = %status, "Feedback processed");
        Ok(())
    }

    async fn delete(ctx: &AdminCtx<'_>, id: &str) -> Result<bool> {
        FeedbackRepository::new(ctx.pool()).delete(id).await
    }
}

// ---------------------------------------------------------------------------
// Email templates

pub(crate) struct EmailTemplates;

fn active_filter(status: &Option<String>) -> Option<bool> {
    match status.as_deref() {
        Some("active") => Some(true),
        Some("inactive") => Some(false),
        _ => None,
    }
}

fn template_request(form: &FormData) -> EmailTemplateRequest {
    EmailTemplateRequest {
        code: form.get("code").to_string(),
        subject: form.get("subject").to_string(),
        // keep the author's whitespace inside the markup
        html_content: form.0.get("html_content").cloned().unwrap_or_default(),
        is_active: form.checked("is_active"),
    }
}

#[async_trait(?Send)]
impl AdminResource for EmailTemplates {
    const SECTION: &'static str = "email-templates";
    const TITLE: &'static str = "Email templates";
    const SINGULAR: &'static str = "email template";
    const ADMIN_ONLY: bool = true;

    fn headers() -> Vec<&'static str> {
        vec!["Code", "Subject", "Active", "Updated"]
    }

    async fn list(
        ctx: &AdminCtx<'_>,
        q: &Option<String>,
        status: &Option<String>,
        page: PageRequest,
    ) -> Result<(Vec<AdminRow>, i64)> {
        let repo = EmailTemplateRepository::new(ctx.pool());
        let active = active_filter(status);
        let rows = repo
            .list(q, active, page)
            .await?
            .into_iter()
            .map(|t| AdminRow {
                cells: vec![
                    t.code.clone(),
                    t.subject.clone(),
                    if t.is_active { "yes" } else { "no" }.to_string(),
                    t.updated_at.chars().take(16).collect(),
                ],
                id: t.id,
            })
            .collect();
        Ok((rows, repo.count(q, active).await?))
    }

    async fn fields(ctx: &AdminCtx<'_>, id: Option<&str>) -> Result<Option<Vec<FormField>>> {
        let template = match id {
            Some(id) => match EmailTemplateRepository::new(ctx.pool()).find_by_id(id).await? {
                Some(t) => Some(t),
                None => return Ok(None),
            },
            None => None,
        };
        let t = template.as_ref();

        Ok(Some(vec![
            FormField::text("code", "Code")
                .required()
                .value(t.map(|t| t.code.clone()).unwrap_or_default()),
            FormField::text("subject", "Subject")
                .required()
                .value(t.map(|t| t.subject.clone()).unwrap_or_default()),
            FormField::new("html_content", "HTML body", "textarea")
                .required()
                .value(t.map(|t| t.html_content.clone()).unwrap_or_default()),
            FormField::new("is_active", "Active", "checkbox")
                .value(if t.map_or(true, |t| t.is_active) { "on" } else { "" }),
        ]))
    }

    async fn create(ctx: &AdminCtx<'_>, form: &FormData) -> Result<String> {
        let template = EmailTemplateRepository::new(ctx.pool())
            .create(template_request(form))
            .await?;
        info!(code = %template.code, "Email template created");
        Ok(template.id)
    }

    async fn update(ctx: &AdminCtx<'_>, id: &str, form: &FormData) -> Result<()> {
        EmailTemplateRepository::new(ctx.pool())
            .update(id, template_request(form))
            .await?;
        Ok(())
    }

    async fn delete(ctx: &AdminCtx<'_>, id: &str) -> Result<bool> {
        EmailTemplateRepository::new(ctx.pool()).delete(id).await
    }

    fn links(id: &str) -> Vec<(String, String)> {
        vec![(
            "Preview".to_string(),
            format!("/admin/email-templates/{}/preview", id),
        )]
    }
}

/// Placeholder values used by previews and test sends
fn sample_vars(state: &AppState, actor: &AuthUser) -> HashMap<&'static str, String> {
    let site_url = state.config.site.url.trim_end_matches('/');
    let mut vars = HashMap::new();
    vars.insert("name", actor.email.clone());
    vars.insert("site_name", state.config.site.name.clone());
    vars.insert("site_url", site_url.to_string());
    vars.insert(
        "reset_url",
        format!("{}/reset-password?token=sample-token", site_url),
    );
    vars
}

async fn load_template(state: &AppState, id: &str) -> std::result::Result<EmailTemplate, PageError> {
    EmailTemplateRepository::new(state.db.pool())
        .find_by_id(id)
        .await?
        .ok_or(PageError::NotFound)
}

fn preview_page(
    state: &AppState,
    auth: AuthUser,
    template: EmailTemplate,
    message: Option<String>,
) -> PageResult {
    let vars = sample_vars(state, &auth);
    let rendered = render_template(&template.html_content, &vars);
    render(&EmailPreviewPage {
        layout: Layout::new(state, Some(auth)),
        template,
        rendered,
        message,
    })
}

async fn preview(
    state: web::Data<AppState>,
    auth: AuthUser,
    path: web::Path<String>,
) -> PageResult {
    guard::<EmailTemplates>(&auth)?;
    let template = load_template(&state, &path).await?;
    preview_page(&state, auth, template, None)
}

async fn send_test(
    state: web::Data<AppState>,
    auth: AuthUser,
    path: web::Path<String>,
    form: web::Form<HashMap<String, String>>,
) -> PageResult {
    guard::<EmailTemplates>(&auth)?;
    let form = FormData(form.into_inner());
    require_csrf(&state, &auth, form.get(CSRF_FIELD))?;

    let template = load_template(&state, &path).await?;
    let to = form.opt("to").unwrap_or_else(|| auth.email.clone());
    let vars = sample_vars(&state, &auth);

    let message = match state
        .mailer
        .send_html(
            &to,
            &render_template(&template.subject, &vars),
            &render_template(&template.html_content, &vars),
        )
        .await
    {
        Ok(()) => {
            info!(code = %template.code, to = %to, "Test email sent");
            format!("Test email sent to {}.", to)
        }
        Err(e) => {
            warn!(code = %template.code, "Test email failed: {}", e);
            format!("Could not send test email: {}", e)
        }
    };
    preview_page(&state, auth, template, Some(message))
}

pub(super) fn configure(cfg: &mut web::ServiceConfig) {
    register::<FeedbackSection>(cfg);
    register::<EmailTemplates>(cfg);
    cfg.service(
        web::resource("/email-templates/{id}/preview").route(web::get().to(preview)),
    )
    .service(web::resource("/email-templates/{id}/test").route(web::post().to(send_test)));
}
