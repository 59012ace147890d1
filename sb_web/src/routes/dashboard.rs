//! ABOUTME: Signed-in user dashboard for profile, own company and own investor profile
//! ABOUTME: Every write is CSRF-checked and scoped to the records linked to the user

use crate::{
    auth::{session_cookie, JwtAuth, PasswordAuth, MIN_PASSWORD_LEN},
    error::{PageError, PageResult},
    middleware::auth::{AuthUser, RequireAuth},
    models::{
        is_valid_phone, non_blank, parse_amount, CompanyForm, CsrfForm, DealForm, InvestorForm,
        PasswordChangeForm, PitchForm, PortfolioForm, ProfileForm, TeamMemberForm,
    },
    routes::{redirect, require_csrf},
    views::{
        filters::group_thousands, render, CreateCompanyPage, CreateInvestorPage, DashboardPage,
        Flash, Layout, NotificationsPage,
    },
    AppState,
};
use actix_web::{web, HttpResponse};
use sb_db::{
    Company, CompanyRepository, CreateCompanyRequest, CreateDealRequest, CreateInvestorRequest,
    DealRepository, Investor, InvestorRepository, NamedTable, NotificationRepository,
    NotificationTemplate, PersonRepository, PersonRequest, PitchRepository, ReferenceRepository,
    Role, UpdateCompanyRequest, UpdateInvestorRequest, UpdateProfileRequest, User,
    UserRepository, INVESTOR_TYPES,
};
use serde::Deserialize;
use tracing::{debug, info, warn};
use validator::ValidateEmail;

const DASHBOARD_NOTIFICATIONS: i64 = 5;
const NOTIFICATIONS_PAGE_LIMIT: i64 = 100;

/// Back to the overview with an error banner
fn failed(code: &str) -> PageResult {
    Ok(redirect(format!("/dashboard?error={}", code)))
}

/// Back to the overview with a success banner
fn done(code: &str) -> PageResult {
    Ok(redirect(format!("/dashboard?success={}", code)))
}

/// Full user row behind the session; a session for a deleted user is stale
async fn current_user(state: &AppState, auth: &AuthUser) -> Result<User, PageError> {
    UserRepository::new(state.db.pool())
        .find_by_id(&auth.id)
        .await?
        .ok_or(PageError::Forbidden)
}

async fn own_company(state: &AppState, user: &User) -> Result<Option<Company>, PageError> {
    match &user.company_id {
        Some(id) => Ok(CompanyRepository::new(state.db.pool()).find_by_id(id).await?),
        None => Ok(None),
    }
}

async fn own_investor(state: &AppState, user: &User) -> Result<Option<Investor>, PageError> {
    match &user.investor_id {
        Some(id) => Ok(InvestorRepository::new(state.db.pool()).find_by_id(id).await?),
        None => Ok(None),
    }
}

/// Redirect that also swaps the session for one carrying the user's new role
fn with_new_role(state: &AppState, user: &User, role: Role, location: &str) -> PageResult {
    let token = JwtAuth::create_token(&user.id, &user.email, role, state.jwt_secret())?;
    Ok(HttpResponse::Found()
        .insert_header(("Location", location))
        .cookie(session_cookie(token, state.config.security.secure_cookies))
        .finish())
}

async fn named_values(state: &AppState, table: NamedTable) -> Result<Vec<String>, PageError> {
    Ok(ReferenceRepository::new(state.db.pool())
        .list_named(table, &None, true)
        .await?
        .into_iter()
        .map(|e| e.name)
        .collect())
}

#[derive(Debug, Default, Deserialize)]
pub struct FlashQuery {
    pub error: Option<String>,
    pub success: Option<String>,
}

async fn overview(
    state: web::Data<AppState>,
    auth: AuthUser,
    query: web::Query<FlashQuery>,
) -> PageResult {
    let pool = state.db.pool();
    let user = current_user(&state, &auth).await?;

    let company = own_company(&state, &user).await?;
    let (team, deals, pitches) = match &company {
        Some(c) => (
            CompanyRepository::new(pool).team(&c.id).await?,
            DealRepository::new(pool).list_by_company(&c.id).await?,
            PitchRepository::new(pool).list_by_company(&c.id).await?,
        ),
        None => (Vec::new(), Vec::new(), Vec::new()),
    };

    let investor = own_investor(&state, &user).await?;
    let portfolio = match &investor {
        Some(i) => InvestorRepository::new(pool).portfolio_companies(&i.id).await?,
        None => Vec::new(),
    };

    let reference = ReferenceRepository::new(pool);
    let notifications = NotificationRepository::new(pool);

    render(&DashboardPage {
        flash: Flash::from_codes(query.error.as_deref(), query.success.as_deref()),
        countries: reference.countries().await?,
        currencies: reference.currencies(true).await?,
        company_options: CompanyRepository::new(pool).options().await?,
        notifications: notifications
            .list(&user.id, DASHBOARD_NOTIFICATIONS, false)
            .await?,
        unread: notifications.unread_count(&user.id).await?,
        layout: Layout::new(&state, Some(auth)),
        user,
        company,
        team,
        deals,
        pitches,
        investor,
        portfolio,
    })
}

/// Which password-change rule a submission breaks, if any
pub(crate) fn password_change_problem(form: &PasswordChangeForm) -> Option<&'static str> {
    if form.new_password != form.confirm_password {
        Some("passwords_dont_match")
    } else if form.new_password.chars().count() < MIN_PASSWORD_LEN {
        Some("password_too_short")
    } else {
        None
    }
}

async fn change_password(
    state: web::Data<AppState>,
    auth: AuthUser,
    form: web::Form<PasswordChangeForm>,
) -> PageResult {
    require_csrf(&state, &auth, &form.csrf_token)?;
    let user = current_user(&state, &auth).await?;

    if !PasswordAuth::verify_password(&form.current_password, &user.password_hash)? {
        warn!(user_id = %user.id, "Password change with wrong current password");
        return failed("invalid_current_password");
    }
    if let Some(code) = password_change_problem(&form) {
        return failed(code);
    }

    let hash = PasswordAuth::hash_password(&form.new_password)?;
    UserRepository::new(state.db.pool())
        .set_password(&user.id, &hash)
        .await?;
    info!(user_id = %user.id, "Password changed");
    done("password_changed")
}

async fn edit_profile(
    state: web::Data<AppState>,
    auth: AuthUser,
    form: web::Form<ProfileForm>,
) -> PageResult {
    require_csrf(&state, &auth, &form.csrf_token)?;
    let form = form.into_inner();
    let repo = UserRepository::new(state.db.pool());

    let phone = non_blank(&form.phone);
    if phone.as_deref().is_some_and(|p| !is_valid_phone(p)) {
        return failed("invalid_phone");
    }

    let email = non_blank(&form.email).map(|e| e.to_lowercase());
    if let Some(email) = &email {
        if !email.validate_email() {
            return failed("invalid_input");
        }
        if let Some(other) = repo.find_by_email(email).await? {
            if other.id != auth.id {
                return failed("email_taken");
            }
        }
    }

    repo.update_profile(
        &auth.id,
        UpdateProfileRequest {
            email,
            first_name: non_blank(&form.first_name),
            last_name: non_blank(&form.last_name),
            country_id: non_blank(&form.country_id),
            city: non_blank(&form.city),
            phone,
            telegram: non_blank(&form.telegram),
            linkedin: non_blank(&form.linkedin),
        },
    )
    .await?;
    done("profile_updated")
}

/// Required-field problems shared by company and investor forms
fn directory_form_errors(name: &str, country: &Option<String>, city: Option<&Option<String>>) -> Vec<String> {
    let mut errors = Vec::new();
    if name.trim().is_empty() {
        errors.push("Name is required.".to_string());
    }
    if non_blank(country).is_none() {
        errors.push("Country is required.".to_string());
    }
    if let Some(city) = city {
        if non_blank(city).is_none() {
            errors.push("City is required.".to_string());
        }
    }
    errors
}

async fn create_company_page(state: web::Data<AppState>, auth: AuthUser) -> PageResult {
    let user = current_user(&state, &auth).await?;
    if user.company_id.is_some() {
        return failed("already_has_company");
    }
    company_form(&state, auth, CompanyForm::default(), Vec::new()).await
}

async fn company_form(
    state: &AppState,
    auth: AuthUser,
    form: CompanyForm,
    errors: Vec<String>,
) -> PageResult {
    render(&CreateCompanyPage {
        layout: Layout::new(state, Some(auth)),
        form,
        errors,
        countries: ReferenceRepository::new(state.db.pool()).countries().await?,
        stages: named_values(state, NamedTable::CompanyStages).await?,
        categories: named_values(state, NamedTable::Categories).await?,
    })
}

async fn create_company(
    state: web::Data<AppState>,
    auth: AuthUser,
    form: web::Form<CompanyForm>,
) -> PageResult {
    require_csrf(&state, &auth, &form.csrf_token)?;
    let form = form.into_inner();
    let user = current_user(&state, &auth).await?;
    if user.company_id.is_some() {
        return failed("already_has_company");
    }

    let errors = directory_form_errors(&form.name, &form.country, Some(&form.city));
    if !errors.is_empty() {
        return company_form(&state, auth, form, errors).await;
    }

    let company = CompanyRepository::new(state.db.pool())
        .create(CreateCompanyRequest {
            name: form.name,
            description: non_blank(&form.description),
            country: non_blank(&form.country),
            city: non_blank(&form.city),
            stage: non_blank(&form.stage),
            industry: non_blank(&form.industry),
            founded_date: non_blank(&form.founded_date),
            website: non_blank(&form.website),
            created_by: Some(user.id.clone()),
            ..Default::default()
        })
        .await?;

    let users = UserRepository::new(state.db.pool());
    users.link_company(&user.id, Some(&company.id)).await?;
    state.invalidator.companies().await;
    info!(user_id = %user.id, company_id = %company.id, "User created a company");

    if user.role() == Role::User {
        users.set_role(&user.id, Role::Startuper).await?;
        return with_new_role(
            &state,
            &user,
            Role::Startuper,
            "/dashboard?success=company_created",
        );
    }
    done("company_created")
}

async fn create_investor_page(state: web::Data<AppState>, auth: AuthUser) -> PageResult {
    let user = current_user(&state, &auth).await?;
    if user.investor_id.is_some() {
        return failed("already_has_investor");
    }
    investor_form(&state, auth, InvestorForm::default(), Vec::new()).await
}

async fn investor_form(
    state: &AppState,
    auth: AuthUser,
    form: InvestorForm,
    errors: Vec<String>,
) -> PageResult {
    render(&CreateInvestorPage {
        layout: Layout::new(state, Some(auth)),
        form,
        errors,
        countries: ReferenceRepository::new(state.db.pool()).countries().await?,
        types: INVESTOR_TYPES.to_vec(),
    })
}

async fn create_investor(
    state: web::Data<AppState>,
    auth: AuthUser,
    form: web::Form<InvestorForm>,
) -> PageResult {
    require_csrf(&state, &auth, &form.csrf_token)?;
    let form = form.into_inner();
    let user = current_user(&state, &auth).await?;
    if user.investor_id.is_some() {
        return failed("already_has_investor");
    }

    let errors = directory_form_errors(&form.name, &form.country, None);
    if !errors.is_empty() {
        return investor_form(&state, auth, form, errors).await;
    }

    let investor = InvestorRepository::new(state.db.pool())
        .create(CreateInvestorRequest {
            name: form.name,
            description: non_blank(&form.description),
            country: non_blank(&form.country),
            focus: non_blank(&form.focus),
            stages: non_blank(&form.stages),
            website: non_blank(&form.website),
            investor_type: non_blank(&form.investor_type),
            logo: None,
            status: None,
        })
        .await?;

    let users = UserRepository::new(state.db.pool());
    users.link_investor(&user.id, Some(&investor.id)).await?;
    state.invalidator.investors().await;
    info!(user_id = %user.id, investor_id = %investor.id, "User created an investor profile");

    if user.role() == Role::User {
        users.set_role(&user.id, Role::Investor).await?;
        return with_new_role(
            &state,
            &user,
            Role::Investor,
            "/dashboard?success=investor_created",
        );
    }
    done("investor_created")
}

/// The caller's company, or the redirect to show when there is none
async fn require_company(state: &AppState, auth: &AuthUser) -> Result<Result<Company, HttpResponse>, PageError> {
    let user = current_user(state, auth).await?;
    Ok(own_company(state, &user)
        .await?
        .ok_or_else(|| redirect("/dashboard?error=no_company")))
}

async fn require_investor(state: &AppState, auth: &AuthUser) -> Result<Result<Investor, HttpResponse>, PageError> {
    let user = current_user(state, auth).await?;
    Ok(own_investor(state, &user)
        .await?
        .ok_or_else(|| redirect("/dashboard?error=no_investor")))
}

async fn edit_company(
    state: web::Data<AppState>,
    auth: AuthUser,
    form: web::Form<CompanyForm>,
) -> PageResult {
    require_csrf(&state, &auth, &form.csrf_token)?;
    let company = match require_company(&state, &auth).await? {
        Ok(c) => c,
        Err(resp) => return Ok(resp),
    };
    let form = form.into_inner();
    if form.name.trim().is_empty() {
        return failed("name_required");
    }

    let pool = state.db.pool();
    let updated = CompanyRepository::new(pool)
        .update(
            &company.id,
            UpdateCompanyRequest {
                name: Some(form.name),
                description: non_blank(&form.description),
                country: non_blank(&form.country),
                city: non_blank(&form.city),
                stage: non_blank(&form.stage),
                industry: non_blank(&form.industry),
                founded_date: non_blank(&form.founded_date),
                website: non_blank(&form.website),
                ..Default::default()
            },
        )
        .await?;

    state.invalidator.companies().await;
    notify_team(
        &state,
        &updated.id,
        NotificationTemplate::company_updated(&updated.name),
        ("company", &updated.id),
        &auth.id,
    )
    .await;
    done("company_updated")
}

fn person_request(form: TeamMemberForm) -> PersonRequest {
    PersonRequest {
        name: form.name.trim().to_string(),
        country: non_blank(&form.country),
        linkedin: non_blank(&form.linkedin),
        role: non_blank(&form.role),
        status: None,
    }
}

/// Tell the rest of the company's users; the write that triggered it stands either way
async fn notify_team(
    state: &AppState,
    company_id: &str,
    template: NotificationTemplate,
    entity: (&str, &str),
    actor_id: &str,
) {
    if let Err(e) = NotificationRepository::new(state.db.pool())
        .notify_company_users(company_id, &template, entity, Some(actor_id))
        .await
    {
        warn!(company_id, kind = %template.kind, "Team notification failed: {}", e);
    }
}

async fn add_team_member(
    state: web::Data<AppState>,
    auth: AuthUser,
    form: web::Form<TeamMemberForm>,
) -> PageResult {
    require_csrf(&state, &auth, &form.csrf_token)?;
    let company = match require_company(&state, &auth).await? {
        Ok(c) => c,
        Err(resp) => return Ok(resp),
    };
    if form.name.trim().is_empty() {
        return failed("name_required");
    }

    let person = PersonRepository::new(state.db.pool())
        .create_for_company(&company.id, person_request(form.into_inner()))
        .await?;
    debug!(company_id = %company.id, person_id = %person.id, "Team member added");
    done("team_updated")
}

async fn edit_team_member(
    state: web::Data<AppState>,
    auth: AuthUser,
    path: web::Path<String>,
    form: web::Form<TeamMemberForm>,
) -> PageResult {
    require_csrf(&state, &auth, &form.csrf_token)?;
    let company = match require_company(&state, &auth).await? {
        Ok(c) => c,
        Err(resp) => return Ok(resp),
    };
    let person_id = path.into_inner();
    let pool = state.db.pool();

    if !CompanyRepository::new(pool)
        .has_team_member(&company.id, &person_id)
        .await?
    {
        return failed("not_found");
    }
    if form.name.trim().is_empty() {
        return failed("name_required");
    }

    PersonRepository::new(pool)
        .update(&person_id, person_request(form.into_inner()))
        .await?;
    done("team_updated")
}

async fn delete_team_member(
    state: web::Data<AppState>,
    auth: AuthUser,
    path: web::Path<String>,
    form: web::Form<CsrfForm>,
) -> PageResult {
    require_csrf(&state, &auth, &form.csrf_token)?;
    let company = match require_company(&state, &auth).await? {
        Ok(c) => c,
        Err(resp) => return Ok(resp),
    };

    if CompanyRepository::new(state.db.pool())
        .remove_team_member(&company.id, &path.into_inner())
        .await?
    {
        done("team_updated")
    } else {
        failed("not_found")
    }
}

async fn add_deal(
    state: web::Data<AppState>,
    auth: AuthUser,
    form: web::Form<DealForm>,
) -> PageResult {
    require_csrf(&state, &auth, &form.csrf_token)?;
    let company = match require_company(&state, &auth).await? {
        Ok(c) => c,
        Err(resp) => return Ok(resp),
    };
    let (Ok(amount), Ok(valuation)) = (parse_amount(&form.amount), parse_amount(&form.valuation))
    else {
        return failed("invalid_amount");
    };

    let pool = state.db.pool();
    let deal = DealRepository::new(pool)
        .create(CreateDealRequest {
            company_id: Some(company.id.clone()),
            deal_type: non_blank(&form.deal_type),
            amount,
            valuation,
            date: non_blank(&form.date),
            currency_id: non_blank(&form.currency_id),
            investors: non_blank(&form.investors),
            status: None,
        })
        .await?;

    state.invalidator.companies().await;
    let shown = amount.map(group_thousands).unwrap_or_else(|| "-".to_string());
    notify_team(
        &state,
        &company.id,
        NotificationTemplate::investment_round(&company.name, &shown),
        ("deal", &deal.id),
        &auth.id,
    )
    .await;
    done("deal_added")
}

async fn delete_deal(
    state: web::Data<AppState>,
    auth: AuthUser,
    path: web::Path<String>,
    form: web::Form<CsrfForm>,
) -> PageResult {
    require_csrf(&state, &auth, &form.csrf_token)?;
    let company = match require_company(&state, &auth).await? {
        Ok(c) => c,
        Err(resp) => return Ok(resp),
    };

    if DealRepository::new(state.db.pool())
        .delete_for_company(&path.into_inner(), &company.id)
        .await?
    {
        state.invalidator.companies().await;
        done("deal_deleted")
    } else {
        failed("not_found")
    }
}

async fn add_pitch(
    state: web::Data<AppState>,
    auth: AuthUser,
    form: web::Form<PitchForm>,
) -> PageResult {
    require_csrf(&state, &auth, &form.csrf_token)?;
    let company = match require_company(&state, &auth).await? {
        Ok(c) => c,
        Err(resp) => return Ok(resp),
    };
    if form.name.trim().is_empty() {
        return failed("name_required");
    }
    if url::Url::parse(form.url.trim()).is_err() {
        return failed("invalid_input");
    }

    PitchRepository::new(state.db.pool())
        .create(&company.id, form.name.trim(), form.url.trim())
        .await?;
    done("pitch_added")
}

async fn delete_pitch(
    state: web::Data<AppState>,
    auth: AuthUser,
    path: web::Path<String>,
    form: web::Form<CsrfForm>,
) -> PageResult {
    require_csrf(&state, &auth, &form.csrf_token)?;
    let company = match require_company(&state, &auth).await? {
        Ok(c) => c,
        Err(resp) => return Ok(resp),
    };

    if PitchRepository::new(state.db.pool())
        .delete(&path.into_inner(), &company.id)
        .await?
    {
        done("pitch_deleted")
    } else {
        failed("not_found")
    }
}

async fn edit_investor(
    state: web::Data<AppState>,
    auth: AuthUser,
    form: web::Form<InvestorForm>,
) -> PageResult {
    require_csrf(&state, &auth, &form.csrf_token)?;
    let investor = match require_investor(&state, &auth).await? {
        Ok(i) => i,
        Err(resp) => return Ok(resp),
    };
    let form = form.into_inner();
    if form.name.trim().is_empty() {
        return failed("name_required");
    }

    InvestorRepository::new(state.db.pool())
        .update(
            &investor.id,
            UpdateInvestorRequest {
                name: Some(form.name),
                description: non_blank(&form.description),
                country: non_blank(&form.country),
                focus: non_blank(&form.focus),
                stages: non_blank(&form.stages),
                website: non_blank(&form.website),
                investor_type: non_blank(&form.investor_type),
                ..Default::default()
            },
        )
        .await?;
    state.invalidator.investors().await;
    done("investor_updated")
}

async fn add_portfolio_company(
    state: web::Data<AppState>,
    auth: AuthUser,
    form: web::Form<PortfolioForm>,
) -> PageResult {
    require_csrf(&state, &auth, &form.csrf_token)?;
    let investor = match require_investor(&state, &auth).await? {
        Ok(i) => i,
        Err(resp) => return Ok(resp),
    };

    let pool = state.db.pool();
    let company_id = form.company_id.trim();
    if CompanyRepository::new(pool).find_by_id(company_id).await?.is_none() {
        return failed("not_found");
    }

    InvestorRepository::new(pool)
        .add_portfolio_company(&investor.id, company_id)
        .await?;
    state.invalidator.investors().await;
    done("portfolio_updated")
}

async fn remove_portfolio_company(
    state: web::Data<AppState>,
    auth: AuthUser,
    path: web::Path<String>,
    form: web::Form<CsrfForm>,
) -> PageResult {
    require_csrf(&state, &auth, &form.csrf_token)?;
    let investor = match require_investor(&state, &auth).await? {
        Ok(i) => i,
        Err(resp) => return Ok(resp),
    };

    if InvestorRepository::new(state.db.pool())
        .remove_portfolio_company(&investor.id, &path.into_inner())
        .await?
    {
        state.invalidator.investors().await;
        done("portfolio_updated")
    } else {
        failed("not_found")
    }
}

async fn notifications_page(state: web::Data<AppState>, auth: AuthUser) -> PageResult {
    let repo = NotificationRepository::new(state.db.pool());
    let notifications = repo.list(&auth.id, NOTIFICATIONS_PAGE_LIMIT, false).await?;
    let unread = repo.unread_count(&auth.id).await?;

    render(&NotificationsPage {
        layout: Layout::new(&state, Some(auth)),
        notifications,
        unread,
    })
}

async fn mark_notification_read(
    state: web::Data<AppState>,
    auth: AuthUser,
    path: web::Path<String>,
    form: web::Form<CsrfForm>,
) -> PageResult {
    require_csrf(&state, &auth, &form.csrf_token)?;
    NotificationRepository::new(state.db.pool())
        .mark_read(&path.into_inner(), &auth.id)
        .await?;
    Ok(redirect("/notifications"))
}

async fn mark_all_notifications_read(
    state: web::Data<AppState>,
    auth: AuthUser,
    form: web::Form<CsrfForm>,
) -> PageResult {
    require_csrf(&state, &auth, &form.csrf_token)?;
    let marked = NotificationRepository::new(state.db.pool())
        .mark_all_read(&auth.id)
        .await?;
    debug!(user_id = %auth.id, marked, "Marked all notifications read");
    Ok(redirect("/notifications"))
}

/// Routes mounted under `/dashboard`
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("")
            .wrap(RequireAuth::redirect_to("/login"))
            .service(web::resource(["", "/"]).route(web::get().to(overview)))
            .route("/user/change-password", web::post().to(change_password))
            .route("/user/edit", web::post().to(edit_profile))
            .service(
                web::resource("/create-company")
                    .route(web::get().to(create_company_page))
                    .route(web::post().to(create_company)),
            )
            .service(
                web::resource("/create-investor")
                    .route(web::get().to(create_investor_page))
                    .route(web::post().to(create_investor)),
            )
            .route("/company/edit", web::post().to(edit_company))
            .route("/company/team/add", web::post().to(add_team_member))
            .route("/company/team/{id}/edit", web::post().to(edit_team_member))
            .route("/company/team/{id}/delete", web::post().to(delete_team_member))
            .route("/company/deals/add", web::post().to(add_deal))
            .route("/company/deals/{id}/delete", web::post().to(delete_deal))
            .route("/company/pitches/add", web::post().to(add_pitch))
            .route("/company/pitches/{id}/delete", web::post().to(delete_pitch))
            .route("/investor/edit", web::post().to(edit_investor))
            .route("/investor/portfolio/add", web::post().to(add_portfolio_company))
            .route(
                "/investor/portfolio/{id}/delete",
                web::post().to(remove_portfolio_company),
            ),
    );
}

/// The notifications page lives at the site root, outside `/dashboard`
pub fn configure_notifications(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/notifications")
            .wrap(RequireAuth::redirect_to("/login"))
            .service(web::resource(["", "/"]).route(web::get().to(notifications_page)))
            .route("/read-all", web::post().to(mark_all_notifications_read))
            .route("/{id}/read", web::post().to(mark_notification_read)),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{create_app, csrf, test_helpers::*};
    use actix_web::{cookie::Cookie, test as actix_test};

    fn password_form(new: &str, confirm: &str) -> PasswordChangeForm {
        PasswordChangeForm {
            csrf_token: String::new(),
            current_password: "old-secret".to_string(),
            new_password: new.to_string(),
            confirm_password: confirm.to_string(),
        }
    }

    #[test]
    fn test_password_change_rules() {
        assert_eq!(
            password_change_problem(&password_form("abcdef", "abcdeg")),
            Some("passwords_dont_match")
        );
        assert_eq!(
            password_change_problem(&password_form("abc", "abc")),
            Some("password_too_short")
        );
        assert_eq!(password_change_problem(&password_form("abcdef", "abcdef")), None);
    }

    #[actix_web::test]
    async fn test_dashboard_redirects_anonymous_visitors() {
        let app = actix_test::init_service(create_app(test_state().await)).await;
        let resp = actix_test::call_service(
            &app,
            actix_test::TestRequest::get().uri("/dashboard").to_request(),
        )
        .await;
        assert_eq!(resp.status(), 302);
        assert_eq!(
            resp.headers().get("location").and_then(|v| v.to_str().ok()),
            Some("/login")
        );
    }

    #[actix_web::test]
    async fn test_create_company_links_user_and_upgrades_role() {
        let state = test_state().await;
        let user = create_user(&state, "founder@example.com", "secret1", Role::User).await;
        let token = token_for(&state, &user);
        let csrf_token = csrf::issue(&user.id, state.jwt_secret());
        let db = state.db.clone();

        let app = actix_test::init_service(create_app(state)).await;
        let req = actix_test::TestRequest::post()
            .uri("/dashboard/create-company")
            .cookie(Cookie::new("auth_token", token))
            .set_form([
                ("csrf_token", csrf_token.as_str()),
                ("name", "Kolesa Labs"),
                ("country", "Kazakhstan"),
                ("city", "Almaty"),
            ])
            .to_request();
        let resp = actix_test::call_service(&app, req).await;
        assert_eq!(resp.status(), 302);
        assert_eq!(
            resp.headers().get("location").and_then(|v| v.to_str().ok()),
            Some("/dashboard?success=company_created")
        );

        let stored = UserRepository::new(db.pool())
            .find_by_id(&user.id)
            .await
            .expect("query")
            .expect("user");
        assert_eq!(stored.role(), Role::Startuper);
        let company_id = stored.company_id.expect("linked company");
        let company = CompanyRepository::new(db.pool())
            .find_by_id(&company_id)
            .await
            .expect("query")
            .expect("company");
        assert_eq!(company.name, "Kolesa Labs");
    }

    #[actix_web::test]
    async fn test_deal_is_kept_when_team_notification_fails() {
        let state = test_state().await;
        let owner = create_user(&state, "owner@example.com", "secret1", Role::Startuper).await;
        let colleague = create_user(&state, "cofounder@example.com", "secret1", Role::User).await;
        let company = CompanyRepository::new(state.db.pool())
            .create(CreateCompanyRequest {
                name: "Tumar Pay".to_string(),
                ..Default::default()
            })
            .await
            .expect("company");
        let users = UserRepository::new(state.db.pool());
        users.link_company(&owner.id, Some(&company.id)).await.expect("link owner");
        users
            .link_company(&colleague.id, Some(&company.id))
            .await
            .expect("link colleague");

        state.queries.analytics().await.expect("warm cache");
        assert_eq!(state.queries.cache().stats().await.total_files, 1);

        // notifications can no longer be written
        sqlx::query("DROP TABLE notifications")
            .execute(state.db.pool())
            .await
            .expect("drop");

        let token = token_for(&state, &owner);
        let csrf_token = csrf::issue(&owner.id, state.jwt_secret());
        let check = state.clone();
        let app = actix_test::init_service(create_app(state)).await;
        let req = actix_test::TestRequest::post()
            .uri("/dashboard/company/deals/add")
            .cookie(Cookie::new("auth_token", token))
            .set_form([
                ("csrf_token", csrf_token.as_str()),
                ("deal_type", "Seed"),
                ("amount", "250000"),
                ("investors", "Steppe Ventures"),
            ])
            .to_request();
        let resp = actix_test::call_service(&app, req).await;
        assert_eq!(resp.status(), 302);
        assert_eq!(
            resp.headers().get("location").and_then(|v| v.to_str().ok()),
            Some("/dashboard?success=deal_added")
        );

        let deals = DealRepository::new(check.db.pool())
            .list_by_company(&company.id)
            .await
            .expect("deals");
        assert_eq!(deals.len(), 1);
        assert_eq!(check.queries.cache().stats().await.total_files, 0);
    }

    #[actix_web::test]
    async fn test_posts_without_csrf_are_forbidden() {
        let state = test_state().await;
        let user = create_user(&state, "nocsrf@example.com", "secret1", Role::User).await;
        let token = token_for(&state, &user);

        let app = actix_test::init_service(create_app(state)).await;
        let req = actix_test::TestRequest::post()
            .uri("/dashboard/user/edit")
            .cookie(Cookie::new("auth_token", token))
            .set_form([("csrf_token", "123.deadbeef"), ("city", "Bishkek")])
            .to_request();
        let resp = actix_test::call_service(&app, req).await;
        assert_eq!(resp.status(), 403);
    }

    #[actix_web::test]
    async fn test_company_actions_require_a_company() {
        let state = test_state().await;
        let user = create_user(&state, "plain@example.com", "secret1", Role::User).await;
        let token = token_for(&state, &user);
        let csrf_token = csrf::issue(&user.id, state.jwt_secret());

        let app = actix_test::init_service(create_app(state)).await;
        let req = actix_test::TestRequest::post()
            .uri("/dashboard/company/pitches/add")
            .cookie(Cookie::new("auth_token", token))
            .set_form([
                ("csrf_token", csrf_token.as_str()),
                ("name", "Deck"),
                ("url", "https://example.com/deck.pdf"),
            ])
            .to_request();
        let resp = actix_test::call_service(&app, req).await;
        assert_eq!(
            resp.headers().get("location").and_then(|v| v.to_str().ok()),
            Some("/dashboard?error=no_company")
        );
    }

    #[actix_web::test]
    async fn test_change_password_rejects_wrong_current_password() {
        let state = test_state().await;
        let user = create_user(&state, "pw@example.com", "secret1", Role::User).await;
        let token = token_for(&state, &user);
        let csrf_token = csrf::issue(&user.id, state.jwt_secret());

        let app = actix_test::init_service(create_app(state)).await;
        let req = actix_test::TestRequest::post()
            .uri("/dashboard/user/change-password")
            .cookie(Cookie::new("auth_token", token))
            .set_form([
                ("csrf_token", csrf_token.as_str()),
                ("current_password", "wrong"),
                ("new_password", "newsecret"),
                ("confirm_password", "newsecret"),
            ])
            .to_request();
        let resp = actix_test::call_service(&app, req).await;
        assert_eq!(
            resp.headers().get("location").and_then(|v| v.to_str().ok()),
            Some("/dashboard?error=invalid_current_password")
        );
    }
}
