use std::{borrow::Cow, path::Path, time::Duration};

use humansize::{ToF64, Unsigned, DECIMAL};
use humantime::format_duration;

use crate::store::ObjectId;

const SHORT_ID_LEN: usize = 12;

pub fn format_path(path: &Path) -> String {
    let path_str = path.to_string_lossy();
    match snailquote::escape(&path_str) {
        Cow::Owned(escaped) => escaped,
        Cow::Borrowed(_) => path_str.into_owned(),
    }
}

pub fn format_size<T: ToF64 + Unsigned>(input: T) -> String {
    humansize::format_size(input, DECIMAL)
}

/// Leading characters of an object ID, enough to tell commits apart in
/// logs.
pub fn format_short_id(id: &ObjectId) -> &str {
    let id = id.as_str();
    id.get(..SHORT_ID_LEN).unwrap_or(id)
}

/// Remaining time rounded up to whole seconds.
pub fn format_eta(ms: u64) -> String {
    let eta = Duration::from_secs(ms.div_ceil(1000));
    format_duration(eta).to_string()
}
