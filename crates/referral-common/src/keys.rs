//! Key namespace shared with the surrounding application.
//!
//! Every key this engine reads, writes or invalidates is built here. The
//! formats are fixed; other services read the same records.

/// Prefix matched by every partner record
pub const PARTNER_PREFIX: &str = "user:";
/// Prefix of a partner record key, followed by the id
pub const PARTNER_ID_PREFIX: &str = "user:id:";
/// Prefix matched by every order record
pub const ORDER_PREFIX: &str = "order:";
/// Prefix matched by every cached listing page
pub const PAGE_PREFIX: &str = "users_page:";
/// Cached listing of every partner
pub const ALL_USERS_LIST: &str = "cache:all_users_list";

/// `user:id:{id}`
#[must_use]
pub fn partner(id: &str) -> String {
    format!("{PARTNER_ID_PREFIX}{id}")
}

/// Partner id encoded in a `user:id:{id}` key
#[must_use]
pub fn partner_id(key: &str) -> Option<&str> {
    key.strip_prefix(PARTNER_ID_PREFIX)
}

/// `order:{id}`
#[must_use]
pub fn order(id: &str) -> String {
    format!("{ORDER_PREFIX}{id}")
}

/// `rank:user:{id}`
#[must_use]
pub fn rank(id: &str) -> String {
    format!("rank:user:{id}")
}

/// `user_metrics:{id}`
#[must_use]
pub fn metrics(id: &str) -> String {
    format!("user_metrics:{id}")
}

/// `users_page:{page}:{filter}:{sort}`
#[must_use]
pub fn page(page: u32, filter: &str, sort: &str) -> String {
    format!("{PAGE_PREFIX}{page}:{filter}:{sort}")
}
