//! Human-readable rendering of alerts

use crate::models::alert::VolatilityEvent;

const MINUTE: u64 = 60;
const HOUR: u64 = 60 * MINUTE;
const DAY: u64 = 24 * HOUR;

/// Render a number of seconds as its largest unit plus the remainder in the next
/// unit down, e.g. `90` -> `1m 30s`, `7200` -> `2h`, `97200` -> `1d 3h`.
pub fn format_interval(secs: u64) -> String {
    let (major, major_unit, minor, minor_unit) = if secs < MINUTE {
        return format!("{}s", secs);
    } else if secs < HOUR {
        (secs / MINUTE, "m", secs % MINUTE, "s")
    } else if secs < DAY {
        (secs / HOUR, "h", (secs % HOUR) / MINUTE, "m")
    } else {
        (secs / DAY, "d", (secs % DAY) / HOUR, "h")
    };

    if minor == 0 {
        format!("{}{}", major, major_unit)
    } else {
        format!("{}{} {}{}", major, major_unit, minor, minor_unit)
    }
}

/// Title and markdown body for a volatility alert
pub fn render_alert(event: &VolatilityEvent) -> (String, String) {
    let trend = event.trend().as_str();
    let title = format!("{} price {} alert", event.symbol, trend);

    let body = format!(
        "**{symbol} price volatility alert**\n\n\
         Time: {time}\n\n\
         Current price: ${price}\n\n\
         Change: {trend} {change:.2}% (crossed the {trend} threshold of {threshold}%)\n\n\
         Last price: ${last_price}\n\n\
         Strategy: checked every {interval}\n",
        symbol = event.symbol,
        time = event.observed_at.format("%Y-%m-%d %H:%M:%S UTC"),
        price = event.price,
        trend = trend,
        change = event.change_pct.abs(),
        threshold = event.threshold(),
        last_price = event.last_price,
        interval = format_interval(event.strategy.interval),
    );

    (title, body)
}
