//! ABOUTME: Two-tier TTL cache (in-process LRU over JSON files) and cached read queries
//! ABOUTME: Prefix invalidation keeps cached listings in step with admin writes

mod file;
mod memory;
mod queries;

pub use file::{cache_key, CacheStats, FileCache, DEFAULT_TTL};
pub use queries::{
    CacheInvalidator, CachedQueries, CompanyFilters, CompanyPage, InvestorFilters, InvestorPage,
    SiteAnalytics, ANALYTICS_PREFIX, COMPANIES_PREFIX, INVESTORS_PREFIX, NEWS_PREFIX,
};
