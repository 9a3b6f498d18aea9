//! Formatting helpers shared by the binary and the stores.

/// Format an integer amount of atomic units as a decimal string with `divisibility` fraction
/// digits, e.g. `1_234_500` with divisibility 6 gives `1.234500`.
pub fn format_relative_amount(amount: u64, divisibility: u32) -> String {
    if divisibility == 0 {
        return amount.to_string();
    }
    let Some(unit) = 10u64.checked_pow(divisibility) else {
        let digits = amount.to_string();
        let width = divisibility as usize;
        return format!("0.{:0>width$}", digits);
    };
    format!(
        "{}.{:0width$}",
        amount / unit,
        amount % unit,
        width = divisibility as usize
    )
}
