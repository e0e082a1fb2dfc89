use alloc::format;
use alloc::string::String;

use crate::TIMESTAMP_LEN;

/// 路径的各级分量，空路径与 `/` 都表示根目录
pub fn components(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|cmp| !cmp.is_empty())
}

/// 规范化的目录路径：以 `/` 开头和结尾，没有空分量
///
/// 从空串开始拼接，缺失的首尾分隔符都会补上。
pub fn normalize_path(path: &str) -> String {
    let mut normalized = String::new();
    normalized.push('/');
    for cmp in components(path) {
        normalized.push_str(cmp);
        normalized.push('/');
    }
    normalized
}

/// 拼出子目录的路径，结果总以 `/` 结尾
pub fn join_path(parent: &str, name: &str) -> String {
    let mut path = normalize_path(parent);
    path.push_str(name);
    path.push('/');
    path
}

/// 把 Unix 秒数格式化为 `YYYY-MM-DD HH:MM:SS`（UTC），以 `\0` 填充
pub fn format_timestamp(secs: u64) -> [u8; TIMESTAMP_LEN] {
    let days = (secs / 86400) as i64;
    let rem = secs % 86400;
    let (year, month, day) = civil_from_days(days);
    let text = format!(
        "{year:04}-{month:02}-{day:02} {:02}:{:02}:{:02}",
        rem / 3600,
        rem % 3600 / 60,
        rem % 60
    );

    let mut buf = [0; TIMESTAMP_LEN];
    fill_cstr(&mut buf, &text);
    buf
}

/// 以 `\0` 结尾、填充的定长字符串；过长的部分在字符边界处截断
pub fn fill_cstr(dest: &mut [u8], src: &str) {
    let mut len = src.len().min(dest.len() - 1);
    while !src.is_char_boundary(len) {
        len -= 1;
    }
    dest.fill(0);
    dest[..len].copy_from_slice(&src.as_bytes()[..len]);
}

pub fn cstr(bytes: &[u8]) -> &str {
    let len = bytes.iter().position(|&c| c == 0).unwrap_or(bytes.len());
    core::str::from_utf8(&bytes[..len]).unwrap_or_default()
}

/// 自1970-01-01起的天数换算为公历日期
fn civil_from_days(days: i64) -> (i64, u32, u32) {
    let z = days + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z.rem_euclid(146_097);
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let month = (if mp < 10 { mp + 3 } else { mp - 9 }) as u32;
    let year = yoe + era * 400 + i64::from(month <= 2);

    (year, month, day)
}
