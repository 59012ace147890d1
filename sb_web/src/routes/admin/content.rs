//! ABOUTME: Admin sections for editorial content: jobs, news, events, podcasts and authors
//! ABOUTME: News writes drop the cached news feed

use super::{cell, register, AdminCtx, AdminResource, FormData, STATUSES};
use crate::views::{same_options, AdminRow, FormField};
use actix_web::web;
use async_trait::async_trait;
use sb_core::Result;
use sb_db::{
    AuthorRepository, AuthorRequest, CompanyRepository, CreateEventRequest, CreateJobRequest,
    CreateNewsRequest, EventFilter, EventRepository, JobFilter, JobRepository, NewsRepository,
    PageRequest, PodcastRepository, PodcastRequest, ReferenceRepository,
};

fn status_field(value: &str) -> FormField {
    FormField::text("status", "Status")
        .options(same_options(STATUSES))
        .value(value)
        .required()
}

fn day(value: &str) -> String {
    value.chars().take(10).collect()
}

// ---------------------------------------------------------------------------
// Jobs

pub(crate) struct Jobs;

#[async_trait(?Send)]
impl AdminResource for Jobs {
    const SECTION: &'static str = "jobs";
    const TITLE: &'static str = "Jobs";
    const SINGULAR: &'static str = "job";

    fn headers() -> Vec<&'static str> {
        vec!["Title", "Company", "City", "Type", "Status"]
    }

    async fn list(
        ctx: &AdminCtx<'_>,
        q: &Option<String>,
        status: &Option<String>,
        page: PageRequest,
    ) -> Result<(Vec<AdminRow>, i64)> {
        let repo = JobRepository::new(ctx.pool());
        let filter = JobFilter {
            q: q.clone(),
            status: status.clone(),
            ..Default::default()
        };
        let rows = repo
            .search(&filter, page)
            .await?
            .into_iter()
            .map(|j| AdminRow {
                cells: vec![
                    j.title.clone(),
                    cell(&j.company_name),
                    cell(&j.city),
                    cell(&j.job_type),
                    j.status.clone(),
                ],
                id: j.id,
            })
            .collect();
        Ok((rows, repo.count(&filter).await?))
    }

    async fn fields(ctx: &AdminCtx<'_>, id: Option<&str>) -> Result<Option<Vec<FormField>>> {
        let job = match id {
            Some(id) => match JobRepository::new(ctx.pool()).find_by_id(id).await? {
                Some(j) => Some(j),
                None => return Ok(None),
            },
            None => None,
        };
        let j = job.as_ref();

        Ok(Some(vec![
            FormField::text("title", "Title")
                .required()
                .value(j.map(|j| j.title.clone()).unwrap_or_default()),
            FormField::new("description", "Description", "textarea")
                .value_opt(&j.and_then(|j| j.description.clone())),
            FormField::text("company_id", "Company")
                .options(CompanyRepository::new(ctx.pool()).options().await?)
                .value_opt(&j.and_then(|j| j.company_id.clone())),
            FormField::text("city", "City").value_opt(&j.and_then(|j| j.city.clone())),
            FormField::text("job_type", "Type").value_opt(&j.and_then(|j| j.job_type.clone())),
            FormField::text("contact", "Contact").value_opt(&j.and_then(|j| j.contact.clone())),
            status_field(j.map(|j| j.status.as_str()).unwrap_or("active")),
        ]))
    }

    async fn create(ctx: &AdminCtx<'_>, form: &FormData) -> Result<String> {
        let job = JobRepository::new(ctx.pool()).create(job_request(form)?).await?;
        Ok(job.id)
    }

    async fn update(ctx: &AdminCtx<'_>, id: &str, form: &FormData) -> Result<()> {
        JobRepository::new(ctx.pool())
            .update(id, job_request(form)?)
            .await?;
        Ok(())
    }

    async fn delete(ctx: &AdminCtx<'_>, id: &str) -> Result<bool> {
        JobRepository::new(ctx.pool()).delete(id).await
    }

    fn links(id: &str) -> Vec<(String, String)> {
        vec![("View on site".to_string(), format!("/job/{}", id))]
    }
}

fn job_request(form: &FormData) -> Result<CreateJobRequest> {
    Ok(CreateJobRequest {
        title: form.required("title", "Title")?,
        description: form.opt("description"),
        company_id: form.opt("company_id"),
        city: form.opt("city"),
        job_type: form.opt("job_type"),
        contact: form.opt("contact"),
        status: Some(form.status()),
    })
}

// ---------------------------------------------------------------------------
// News

pub(crate) struct News;

#[async_trait(?Send)]
impl AdminResource for News {
    const SECTION: &'static str = "news";
    const TITLE: &'static str = "News";
    const SINGULAR: &'static str = "article";
    const CACHE_KIND: Option<&'static str> = Some("news");

    fn headers() -> Vec<&'static str> {
        vec!["Title", "Author", "Date", "Views", "Status"]
    }

    async fn list(
        ctx: &AdminCtx<'_>,
        q: &Option<String>,
        status: &Option<String>,
        page: PageRequest,
    ) -> Result<(Vec<AdminRow>, i64)> {
        let repo = NewsRepository::new(ctx.pool());
        let rows = repo
            .list(q, status, page)
            .await?
            .into_iter()
            .map(|n| AdminRow {
                cells: vec![
                    n.title.clone(),
                    cell(&n.author_name),
                    day(&n.date),
                    n.views.to_string(),
                    n.status.clone(),
                ],
                id: n.id,
            })
            .collect();
        Ok((rows, repo.count(q, status).await?))
    }

    async fn fields(ctx: &AdminCtx<'_>, id: Option<&str>) -> Result<Option<Vec<FormField>>> {
        let article = match id {
            Some(id) => match NewsRepository::new(ctx.pool()).find_by_id(id).await? {
                Some(n) => Some(n),
                None => return Ok(None),
            },
            None => None,
        };
        let n = article.as_ref();
        let mut fields = vec![
            FormField::text("title", "Title")
                .required()
                .value(n.map(|n| n.title.clone()).unwrap_or_default()),
            FormField::new("summary", "Summary", "textarea")
                .value_opt(&n.and_then(|n| n.summary.clone())),
            FormField::new("content", "Content", "textarea")
                .value_opt(&n.and_then(|n| n.content.clone())),
            FormField::new("date", "Date", "date")
                .value(n.map(|n| day(&n.date)).unwrap_or_default()),
            FormField::text("author_id", "Author")
                .options(AuthorRepository::new(ctx.pool()).options().await?)
                .value_opt(&n.and_then(|n| n.author_id.clone())),
            status_field(n.map(|n| n.status.as_str()).unwrap_or("active")),
        ];
        if let Some(n) = n {
            fields.insert(1, FormField::new("slug", "Slug", "readonly").value(n.slug.clone()));
        }
        Ok(Some(fields))
    }

    async fn create(ctx: &AdminCtx<'_>, form: &FormData) -> Result<String> {
        let news = NewsRepository::new(ctx.pool())
            .create(news_request(form)?)
            .await?;
        Ok(news.id)
    }

    async fn update(ctx: &AdminCtx<'_>, id: &str, form: &FormData) -> Result<()> {
        NewsRepository::new(ctx.pool())
            .update(id, news_request(form)?)
            .await?;
        Ok(())
    }

    async fn delete(ctx: &AdminCtx<'_>, id: &str) -> Result<bool> {
        NewsRepository::new(ctx.pool()).delete(id).await
    }

}

fn news_request(form: &FormData) -> Result<CreateNewsRequest> {
    Ok(CreateNewsRequest {
        title: form.required("title", "Title")?,
        summary: form.opt("summary"),
        content: form.opt("content"),
        date: form.opt("date"),
        status: Some(form.status()),
        author_id: form.opt("author_id"),
    })
}

// ---------------------------------------------------------------------------
// Events

pub(crate) struct Events;

#[async_trait(?Send)]
impl AdminResource for Events {
    const SECTION: &'static str = "events";
    const TITLE: &'static str = "Events";
    const SINGULAR: &'static str = "event";

    fn headers() -> Vec<&'static str> {
        vec!["Title", "Date", "Format", "Country", "Status"]
    }

    async fn list(
        ctx: &AdminCtx<'_>,
        q: &Option<String>,
        status: &Option<String>,
        page: PageRequest,
    ) -> Result<(Vec<AdminRow>, i64)> {
        let repo = EventRepository::new(ctx.pool());
        let filter = EventFilter {
            q: q.clone(),
            status: status.clone(),
            ..Default::default()
        };
        let rows = repo
            .search(&filter, page)
            .await?
            .into_iter()
            .map(|e| AdminRow {
                cells: vec![
                    e.title.clone(),
                    e.date.as_deref().map(day).unwrap_or_default(),
                    cell(&e.format),
                    cell(&e.country),
                    e.status.clone(),
                ],
                id: e.id,
            })
            .collect();
        Ok((rows, repo.count(&filter).await?))
    }

    async fn fields(ctx: &AdminCtx<'_>, id: Option<&str>) -> Result<Option<Vec<FormField>>> {
        let event = match id {
            Some(id) => match EventRepository::new(ctx.pool()).find_by_id(id).await? {
                Some(e) => Some(e),
                None => return Ok(None),
            },
            None => None,
        };
        let e = event.as_ref();
        let countries = same_options(
            ReferenceRepository::new(ctx.pool())
                .countries()
                .await?
                .into_iter()
                .map(|c| c.name),
        );

        Ok(Some(vec![
            FormField::text("title", "Title")
                .required()
                .value(e.map(|e| e.title.clone()).unwrap_or_default()),
            FormField::new("description", "Description", "textarea")
                .value_opt(&e.and_then(|e| e.description.clone())),
            // datetime-local wants minutes precision
            FormField::new("date", "Starts", "datetime-local").value(
                e.and_then(|e| e.date.as_deref())
                    .map(|d| d.chars().take(16).collect::<String>())
                    .unwrap_or_default(),
            ),
            FormField::text("format", "Format").value_opt(&e.and_then(|e| e.format.clone())),
            FormField::text("location", "Location").value_opt(&e.and_then(|e| e.location.clone())),
            FormField::text("country", "Country")
                .options(countries)
                .value_opt(&e.and_then(|e| e.country.clone())),
            FormField::new("registration_url", "Registration link", "url")
                .value_opt(&e.and_then(|e| e.registration_url.clone())),
            status_field(e.map(|e| e.status.as_str()).unwrap_or("active")),
        ]))
    }

    async fn create(ctx: &AdminCtx<'_>, form: &FormData) -> Result<String> {
        let event = EventRepository::new(ctx.pool())
            .create(event_request(form)?)
            .await?;
        Ok(event.id)
    }

    async fn update(ctx: &AdminCtx<'_>, id: &str, form: &FormData) -> Result<()> {
        EventRepository::new(ctx.pool())
            .update(id, event_request(form)?)
            .await?;
        Ok(())
    }

    async fn delete(ctx: &AdminCtx<'_>, id: &str) -> Result<bool> {
        EventRepository::new(ctx.pool()).delete(id).await
    }

    fn links(id: &str) -> Vec<(String, String)> {
        vec![("View on site".to_string(), format!("/event/{}", id))]
    }
}

fn event_request(form: &FormData) -> Result<CreateEventRequest> {
    Ok(CreateEventRequest {
        title: form.required("title", "Title")?,
        description: form.opt("description"),
        date: form.opt("date"),
        format: form.opt("format"),
        location: form.opt("location"),
        country: form.opt("country"),
        registration_url: form.opt("registration_url"),
        status: Some(form.status()),
    })
}

// ---------------------------------------------------------------------------
// Podcasts

pub(crate) struct Podcasts;

#[async_trait(?Send)]
impl AdminResource for Podcasts {
    const SECTION: &'static str = "podcasts";
    const TITLE: &'static str = "Podcasts";
    const SINGULAR: &'static str = "podcast";

    fn headers() -> Vec<&'static str> {
        vec!["Title", "Date", "YouTube", "Status"]
    }

    async fn list(
        ctx: &AdminCtx<'_>,
        q: &Option<String>,
        status: &Option<String>,
        page: PageRequest,
    ) -> Result<(Vec<AdminRow>, i64)> {
        let repo = PodcastRepository::new(ctx.pool());
        let rows = repo
            .list(q, status, page)
            .await?
            .into_iter()
            .map(|p| AdminRow {
                cells: vec![
                    p.title.clone(),
                    day(&p.date),
                    cell(&p.youtube_url),
                    p.status.clone(),
                ],
                id: p.id,
            })
            .collect();
        Ok((rows, repo.count(q, status).await?))
    }

    async fn fields(ctx: &AdminCtx<'_>, id: Option<&str>) -> Result<Option<Vec<FormField>>> {
        let podcast = match id {
            Some(id) => match PodcastRepository::new(ctx.pool()).find_by_id(id).await? {
                Some(p) => Some(p),
                None => return Ok(None),
            },
            None => None,
        };
        let p = podcast.as_ref();

        Ok(Some(vec![
            FormField::text("title", "Title")
                .required()
                .value(p.map(|p| p.title.clone()).unwrap_or_default()),
            FormField::new("description", "Description", "textarea")
                .value_opt(&p.and_then(|p| p.description.clone())),
            FormField::new("youtube_url", "YouTube link", "url")
                .value_opt(&p.and_then(|p| p.youtube_url.clone())),
            FormField::new("date", "Date", "date").value(p.map(|p| day(&p.date)).unwrap_or_default()),
            status_field(p.map(|p| p.status.as_str()).unwrap_or("active")),
        ]))
    }

    async fn create(ctx: &AdminCtx<'_>, form: &FormData) -> Result<String> {
        let podcast = PodcastRepository::new(ctx.pool())
            .create(podcast_request(form)?)
            .await?;
        Ok(podcast.id)
    }

    async fn update(ctx: &AdminCtx<'_>, id: &str, form: &FormData) -> Result<()> {
        PodcastRepository::new(ctx.pool())
            .update(id, podcast_request(form)?)
            .await?;
        Ok(())
    }

    async fn delete(ctx: &AdminCtx<'_>, id: &str) -> Result<bool> {
        PodcastRepository::new(ctx.pool()).delete(id).await
    }
}

fn podcast_request(form: &FormData) -> Result<PodcastRequest> {
    Ok(PodcastRequest {
        title: form.required("title", "Title")?,
        description: form.opt("description"),
        youtube_url: form.opt("youtube_url"),
        date: form.opt("date"),
        status: Some(form.status()),
    })
}

// ---------------------------------------------------------------------------
// Authors

pub(crate) struct Authors;

#[async_trait(?Send)]
impl AdminResource for Authors {
    const SECTION: &'static str = "authors";
    const TITLE: &'static str = "Authors";
    const SINGULAR: &'static str = "author";

    fn headers() -> Vec<&'static str> {
        vec!["Name", "Website", "Status"]
    }

    fn statuses() -> Vec<&'static str> {
        Vec::new()
    }

    async fn list(
        ctx: &AdminCtx<'_>,
        q: &Option<String>,
        _status: &Option<String>,
        page: PageRequest,
    ) -> Result<(Vec<AdminRow>, i64)> {
        let repo = AuthorRepository::new(ctx.pool());
        let rows = repo
            .list(q, page)
            .await?
            .into_iter()
            .map(|a| AdminRow {
                cells: vec![a.name.clone(), cell(&a.website), a.status.clone()],
                id: a.id,
            })
            .collect();
        Ok((rows, repo.count(q).await?))
    }

    async fn fields(ctx: &AdminCtx<'_>, id: Option<&str>) -> Result<Option<Vec<FormField>>> {
        let author = match id {
            Some(id) => match AuthorRepository::new(ctx.pool()).find_by_id(id).await? {
                Some(a) => Some(a),
                None => return Ok(None),
            },
            None => None,
        };
        let a = author.as_ref();

        Ok(Some(vec![
            FormField::text("name", "Name")
                .required()
                .value(a.map(|a| a.name.clone()).unwrap_or_default()),
            FormField::new("description", "Description", "textarea")
                .value_opt(&a.and_then(|a| a.description.clone())),
            FormField::new("website", "Website", "url").value_opt(&a.and_then(|a| a.website.clone())),
            status_field(a.map(|a| a.status.as_str()).unwrap_or("active")),
        ]))
    }

    async fn create(ctx: &AdminCtx<'_>, form: &FormData) -> Result<String> {
        let author = AuthorRepository::new(ctx.pool())
            .create(author_request(form)?)
            .await?;
        Ok(author.id)
    }

    async fn update(ctx: &AdminCtx<'_>, id: &str, form: &FormData) -> Result<()> {
        AuthorRepository::new(ctx.pool())
            .update(id, author_request(form)?)
            .await?;
        Ok(())
    }

    async fn delete(ctx: &AdminCtx<'_>, id: &str) -> Result<bool> {
        AuthorRepository::new(ctx.pool()).delete(id).await
    }
}

fn author_request(form: &FormData) -> Result<AuthorRequest> {
    Ok(AuthorRequest {
        name: form.required("name", "Name")?,
        description: form.opt("description"),
        website: form.opt("website"),
        status: Some(form.status()),
    })
}

pub(super) fn configure(cfg: &mut web::ServiceConfig) {
    register::<Jobs>(cfg);
    register::<News>(cfg);
    register::<Events>(cfg);
    register::<Podcasts>(cfg);
    register::<Authors>(cfg);
}
