/// Minutes relative to the beginning of the schedule.
pub type Mtime = i32;
pub type MFloat = f64;

pub type NodeIdx = usize;

pub fn to_mtime(t: i64, reference: i64) -> Mtime {
    ((t - reference) as MFloat / 60.0).round() as Mtime
}

pub fn from_mtime(mtime: Mtime, reference: i64) -> i64 {
    (mtime as i64) * 60 + reference
}

/// `d.hh:mm` rendering for log output.
pub fn format_time(t: Mtime) -> String {
    let day = t.div_euclid(1440);
    let minutes = t.rem_euclid(1440);
    format!("{}.{:02}:{:02}", day, minutes / 60, minutes % 60)
}
