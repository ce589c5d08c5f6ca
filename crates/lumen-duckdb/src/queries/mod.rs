//! Dashboard aggregation queries.
//!
//! Every query here is scoped to `website.reset_at <= created_at` (falling
//! back to `created_at`) and an explicit `[start, end]` window, and composes
//! its dynamic predicates from `lumen_core::filters`.

pub mod event_data;
pub mod metrics;
pub mod pageviews;
pub mod realtime;
pub mod stats;

use chrono::{DateTime, Utc};

use lumen_core::filters::{ParamValue, SqlFragment};

use crate::backend::format_ts;

/// The fixed leading parameters shared by the aggregate queries:
/// `?1` website, `?2` reset bound, `?3`/`?4` window, then filter values.
pub(crate) fn base_params(
    website_id: &str,
    reset: DateTime<Utc>,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    fragment: &SqlFragment,
) -> Vec<ParamValue> {
    let mut params = vec![
        ParamValue::Text(website_id.to_string()),
        ParamValue::Timestamp(format_ts(reset)),
        ParamValue::Timestamp(format_ts(start)),
        ParamValue::Timestamp(format_ts(end)),
    ];
    params.extend(fragment.params().to_vec());
    params
}

/// Index of the first filter placeholder after [`base_params`].
pub(crate) const FILTERS_START: usize = 5;
