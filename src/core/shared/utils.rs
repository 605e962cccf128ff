use diesel::{
    r2d2::{ConnectionManager, Pool},
    PgConnection,
};
use serde::Serialize;

pub type DbPool = Pool<ConnectionManager<PgConnection>>;

pub fn create_conn(database_url: &str, max_size: u32) -> Result<DbPool, diesel::r2d2::PoolError> {
    let manager = ConnectionManager::<PgConnection>::new(database_url);
    Pool::builder().max_size(max_size.max(1)).build(manager)
}

/// Run database migrations
pub fn run_migrations(pool: &DbPool) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};

    const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

    let mut conn = pool.get()?;
    let applied = conn.run_pending_migrations(MIGRATIONS).map_err(
        |e| -> Box<dyn std::error::Error + Send + Sync> {
            Box::new(std::io::Error::other(format!("Migration error: {}", e)))
        },
    )?;
    for version in applied {
        tracing::info!("Applied migration {}", version);
    }
    Ok(())
}

pub fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

/// `"requested_by_other" -> "Requested By Other"`
pub fn title_case_key(key: &str) -> String {
    key.split('_')
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Wraps a user search term for `ILIKE`, escaping the pattern metacharacters.
pub fn ilike_pattern(term: &str) -> String {
    let escaped = term
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

/// One page of a query result.
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: i64,
    pub per_page: i64,
    pub total: i64,
}

impl<T> Page<T> {
    pub fn empty(per_page: i64) -> Self {
        Self {
            items: Vec::new(),
            page: 1,
            per_page,
            total: 0,
        }
    }

    pub fn pages(&self) -> i64 {
        if self.per_page <= 0 {
            return 1;
        }
        ((self.total + self.per_page - 1) / self.per_page).max(1)
    }

    pub fn has_prev(&self) -> bool {
        self.page > 1
    }

    pub fn has_next(&self) -> bool {
        self.page < self.pages()
    }
}

/// Lenient `?page=` parsing: anything that is not an integer means page 1.
pub fn parse_page(raw: Option<&str>) -> Option<i64> {
    raw.and_then(|v| v.trim().parse().ok())
}

/// Returns `(page, offset)` for a 1-based page number. Pages below 1 mean the
/// first page; pages past the end are kept and simply come back empty.
pub fn page_window(requested: Option<i64>, per_page: i64) -> (i64, i64) {
    let per_page = per_page.max(1);
    let page = requested.unwrap_or(1).max(1);
    (page, (page - 1).saturating_mul(per_page))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_html_escape() {
        assert_eq!(
            html_escape("<a href=\"x\">O'Neil & co</a>"),
            "&lt;a href=&quot;x&quot;&gt;O&#39;Neil &amp; co&lt;/a&gt;"
        );
    }

    #[test]
    fn test_title_case_key() {
        assert_eq!(title_case_key("equipment_type_other"), "Equipment Type Other");
        assert_eq!(title_case_key("purpose"), "Purpose");
        assert_eq!(title_case_key("__x__"), "X");
    }

    #[test]
    fn test_ilike_pattern_escapes_wildcards() {
        assert_eq!(ilike_pattern("ICT"), "%ICT%");
        assert_eq!(ilike_pattern("50%_"), "%50\\%\\_%");
    }

    #[test]
    fn test_page_window() {
        assert_eq!(page_window(None, 10), (1, 0));
        assert_eq!(page_window(Some(3), 10), (3, 20));
        assert_eq!(page_window(Some(-2), 10), (1, 0));
        assert_eq!(page_window(Some(0), 0), (1, 0));
    }

    #[test]
    fn test_page_past_the_end_stays_empty() {
        let (page, offset) = page_window(Some(9), 10);
        assert_eq!((page, offset), (9, 80));

        let past_end: Page<u8> = Page {
            items: vec![],
            page,
            per_page: 10,
            total: 25,
        };
        assert_eq!(past_end.pages(), 3);
        assert!(past_end.has_prev());
        assert!(!past_end.has_next());
    }

    #[test]
    fn test_parse_page() {
        assert_eq!(parse_page(Some("3")), Some(3));
        assert_eq!(parse_page(Some("abc")), None);
        assert_eq!(parse_page(None), None);
    }

    #[test]
    fn test_page_counts() {
        let page: Page<u8> = Page {
            items: vec![],
            page: 2,
            per_page: 10,
            total: 21,
        };
        assert_eq!(page.pages(), 3);
        assert!(page.has_prev());
        assert!(page.has_next());
        assert_eq!(Page::<u8>::empty(10).pages(), 1);
    }
}
