//! Human-readable rendering of a [`BuildReport`]: the Markdown report, a short
//! notification and an alert listing warnings.

use chrono::{DateTime, Duration, Utc};
use kvas_domains_core::aggregate::SourceHealth;
use kvas_domains_core::budget::{UsageTier, CRITICAL_PCT, WARNING_PCT};
use kvas_domains_core::diff::DomainDiff;
use kvas_domains_core::directive::Domain;
use kvas_domains_core::pipeline::{BuildReport, Severity};
use kvas_domains_core::trend::{TrendAssessment, TrendDirection};

use crate::store::RenderedReports;

const TOP_N: usize = 20;

/// Labels that are not part of the build itself.
#[derive(Debug, Clone, Default)]
pub struct ReportContext {
    pub repo: Option<String>,
    pub output_path: String,
}

/// Build time in Moscow time (UTC+3, no DST).
pub fn format_build_time(ts: DateTime<Utc>) -> String {
    (ts.naive_utc() + Duration::hours(3))
        .format("%d %b %Y, %H:%M MSK")
        .to_string()
}

/// `abcd…wxyz` for long hashes, `—` for a missing one.
pub fn short_hash(hash: &str) -> String {
    let h = hash.trim();
    if h.len() < 10 {
        return if h.is_empty() { "—".into() } else { h.into() };
    }
    format!("{}…{}", &h[..4], &h[h.len() - 4..])
}

fn tier_badge(tier: UsageTier) -> &'static str {
    match tier {
        UsageTier::Normal => "🟢",
        UsageTier::Warning => "🟡",
        UsageTier::Critical => "🔴",
    }
}

fn health_badge(health: &SourceHealth) -> &'static str {
    match health {
        SourceHealth::Ok => "🟢",
        SourceHealth::Empty => "🟡",
        SourceHealth::Failed { .. } => "🔴",
    }
}

fn risk_label(usage_pct: f64) -> &'static str {
    if usage_pct < WARNING_PCT {
        "low 🟢"
    } else if usage_pct < CRITICAL_PCT {
        "medium 🟡"
    } else {
        "high 🔴"
    }
}

fn assessment_line(assessment: TrendAssessment) -> &'static str {
    match assessment {
        TrendAssessment::Surge => "📈 Surge (over 2× the average)",
        TrendAssessment::Growing => "📈 Growing",
        TrendAssessment::Stable => "➡ Stable",
        TrendAssessment::Shrinking => "📉 Shrinking",
    }
}

fn direction_icon(direction: TrendDirection) -> &'static str {
    match direction {
        TrendDirection::Rising => "📈",
        TrendDirection::Falling => "📉",
        TrendDirection::Flat => "➡️",
    }
}

fn repo_report_url(repo: Option<&str>) -> Option<String> {
    let r = repo?.trim();
    if r.is_empty() || !r.contains('/') {
        return None;
    }
    Some(format!("https://github.com/{r}/blob/main/dist/report.md"))
}

fn yes_no(flag: bool) -> &'static str {
    if flag {
        "YES"
    } else {
        "NO"
    }
}

fn push_top(lines: &mut Vec<String>, domains: &[Domain]) {
    if domains.is_empty() {
        lines.push("- —".into());
        return;
    }
    lines.extend(domains.iter().take(TOP_N).map(|d| format!("- {d}")));
}

fn push_diff(lines: &mut Vec<String>, title: &str, diff: &DomainDiff) {
    lines.push(format!("### {title}"));
    lines.push("**➕ Added**".into());
    push_top(lines, &diff.added);
    lines.push(String::new());
    lines.push("**➖ Removed**".into());
    push_top(lines, &diff.removed);
    lines.push(String::new());
}

fn problems(report: &BuildReport) -> Vec<String> {
    let status = &report.status;
    let mut out = Vec::new();
    if !status.failed_sources.is_empty() {
        out.push(format!(
            "🔴 Sources failed to download: {}",
            status.failed_sources.join(", ")
        ));
    }
    if !status.empty_sources.is_empty() {
        out.push(format!(
            "🟡 Empty sources (0 domains): {}",
            status.empty_sources.join(", ")
        ));
    }
    if report.budget.near_limit || report.budget.tier == UsageTier::Critical {
        out.push("🟠 Close to the limit".into());
    }
    if report.budget.truncated() {
        out.push(format!(
            "🔴 Truncated by the limit: {} lines",
            report.budget.truncated_lines
        ));
    }
    if status.failed {
        out.push("🔴 No domains could be established; previous list kept".into());
    }
    out
}

pub fn render_markdown(report: &BuildReport, ctx: &ReportContext) -> String {
    let budget = &report.budget;
    let status = &report.status;
    let trend = &report.trend;
    let badge = tier_badge(budget.tier);
    let primary_total = report.primary().map_or(0, |p| p.valid_domains);
    let extras: Vec<_> = report.extras().collect();
    let ok = extras.iter().filter(|s| s.health == SourceHealth::Ok).count();
    let failed = extras.iter().filter(|s| s.health.is_failed()).count();
    let empty = extras.iter().filter(|s| s.health.is_empty()).count();

    let mut l: Vec<String> = Vec::new();
    l.push("# 📊 KVAS domain list build report".into());
    l.push(String::new());
    l.push("## 🧭 General".into());
    l.push(String::new());
    l.push(format!("> 🕒 **Build:** {}  ", format_build_time(report.build_time_utc)));
    l.push(format!(
        "> 📦 **Repository:** {}  ",
        ctx.repo.as_deref().unwrap_or("unknown/unknown")
    ));
    l.push(format!("> 📄 **Output file:** `{}`  ", ctx.output_path));
    l.push(format!("> 📏 Line limit: **{}**", budget.max_lines));
    if let Some(url) = repo_report_url(ctx.repo.as_deref()) {
        l.push(format!("> 🔗 Report: {url}"));
    }
    l.push(String::new());
    l.push("---".into());
    l.push(String::new());

    l.push("## 🧮 Result".into());
    l.push(String::new());
    l.push(format!(
        "> ### 📊 {} / {} ({}%) {badge}",
        budget.output_lines, budget.max_lines, budget.usage_pct
    ));
    l.push(format!("> **Reserve:** {} lines  ", budget.reserve()));
    l.push(format!("> **Truncated:** {}", yes_no(budget.truncated())));
    l.push(String::new());
    l.push("---".into());
    l.push(String::new());

    l.push("## 🚦 Status".into());
    l.push(String::new());
    l.push(
        match status.severity {
            Severity::Error => "### 🚨 Build finished with errors",
            Severity::Warning => "### ⚠️ Build finished with warnings",
            Severity::Ok => "### ✅ Build finished",
        }
        .into(),
    );
    let remarks = problems(report);
    if remarks.is_empty() && status.warnings.is_empty() {
        l.push("### 🟢 No warnings".into());
    } else if status.severity == Severity::Error {
        l.push("### 🔴 Critical status".into());
    } else {
        l.push("### 🟡 Needs attention".into());
    }
    l.push(String::new());
    if remarks.is_empty() {
        l.push("### ✅ No remarks".into());
    } else {
        l.push("### ⚠️ Remarks".into());
        l.extend(remarks.iter().map(|r| format!("- {r}")));
    }
    l.push(String::new());
    if !status.warnings.is_empty() {
        l.push("### 📝 Warnings".into());
        l.extend(status.warnings.iter().map(|w| format!("- {w}")));
        l.push(String::new());
    }
    l.push("---".into());
    l.push(String::new());

    l.push("## 📌 Sources".into());
    l.push(String::new());
    l.push(format!(
        "### 🗂 {}",
        report.primary().map_or("primary", |p| p.name.as_str())
    ));
    l.push(String::new());
    l.push(format!("- Domains: **{primary_total}**"));
    l.push(format!(
        "- Change: **+{} / -{}**",
        report.diff.primary.added.len(),
        report.diff.primary.removed.len()
    ));
    l.push(String::new());
    l.push("### 🌐 Extras".into());
    l.push(String::new());
    l.push(format!("- Extras added: **{}**", report.merge.extras_added_total));
    l.push(format!(
        "- Change: **+{} / -{}**",
        report.diff.extras.added.len(),
        report.diff.extras.removed.len()
    ));
    l.push(format!("- Categories: **{}**", extras.len()));
    l.push(String::new());
    l.push(format!("🟢 OK: {ok}  "));
    l.push(format!("🔴 FAILED: {failed}  "));
    l.push(format!("🟡 EMPTY: {empty}"));
    l.push(String::new());
    l.push("### 📦 Final list".into());
    l.push(String::new());
    l.push(format!("- Total: **{}**", budget.output_lines));
    l.push(format!(
        "- Change: **+{} / -{}**",
        report.diff.output.added.len(),
        report.diff.output.removed.len()
    ));
    l.push(format!("- Truncated: **{}**", budget.truncated_lines));
    l.push(String::new());
    l.push("---".into());
    l.push(String::new());

    l.push("## 📈 Limit usage".into());
    l.push(String::new());
    l.push(format!(
        "### 📊 {} / {} ({}%) {badge}",
        budget.output_lines, budget.max_lines, budget.usage_pct
    ));
    l.push(String::new());
    l.push("🟢 below 85% — normal  ".into());
    l.push("🟡 85–96% — attention  ".into());
    l.push("🔴 ≥ 96% — critical".into());
    l.push(String::new());
    l.push(format!(
        "Close to the limit: **{}** (threshold {})",
        yes_no(budget.near_limit),
        budget.near_limit_threshold
    ));
    l.push(String::new());
    l.push("---".into());
    l.push(String::new());

    l.push("## 📂 Extras categories".into());
    l.push(String::new());
    l.push("| Category | Valid | Added | Invalid | Skipped | Status |".into());
    l.push("|---|---:|---:|---:|---:|---|".into());
    if extras.is_empty() {
        l.push("| — | 0 | 0 | 0 | 0 | — |".into());
    }
    for s in &extras {
        l.push(format!(
            "| {} | {} | {} | {} | {} | {} |",
            s.name,
            s.valid_domains,
            s.extras_added,
            s.invalid_lines,
            s.skipped_directives,
            health_badge(&s.health)
        ));
    }
    l.push(String::new());
    l.push("---".into());
    l.push(String::new());

    l.push("## 🔐 Hash".into());
    l.push(String::new());
    l.push(format!("> sha256(final): **{}**", short_hash(&report.content_hash)));
    l.push(String::new());
    l.push("---".into());
    l.push(String::new());

    l.push("<details>".into());
    l.push(format!("<summary>🔄 Changes (top {TOP_N})</summary>"));
    l.push(String::new());
    push_diff(&mut l, "primary", &report.diff.primary);
    l.push("---".into());
    l.push(String::new());
    push_diff(&mut l, "extras", &report.diff.extras);
    l.push("---".into());
    l.push(String::new());
    push_diff(&mut l, "final list", &report.diff.output);
    l.push("</details>".into());
    l.push(String::new());

    l.push("<details>".into());
    l.push("<summary>🧪 Diagnostics</summary>".into());
    l.push(String::new());
    l.push(format!("- primary source: **{primary_total}** unique domains"));
    l.push(format!(
        "- extras: **{}** domains (after overlap removal)",
        report.merge.extras_added_total
    ));
    l.push(format!(
        "- merged before limit: **{}** lines",
        budget.pre_truncation
    ));
    l.push(format!("- reserve: **{}** lines", budget.reserve()));
    l.push(format!("- overflow risk: **{}**", risk_label(budget.usage_pct)));
    l.push(String::new());
    l.push("### 📈 Trend".into());
    l.push(format!("- Average ({}): **{}**", trend.window, trend.rolling_average));
    l.push(format!("- Δ to previous: **{:+}**", trend.delta));
    l.push(format!("- Deviation: **{:+}**", trend.deviation));
    l.push(format!("- {}", assessment_line(trend.assessment)));
    l.push(format!(
        "- Builds: **{}**, min **{}**, max **{}**, since first **{:+}**",
        trend.points, trend.min_total, trend.max_total, trend.growth_since_first
    ));
    l.push(String::new());
    l.push("### ✅ Recommendations".into());
    let mut check: Vec<String> = status
        .failed_sources
        .iter()
        .map(|f| f.split(" (").next().unwrap_or(f).to_string())
        .collect();
    check.extend(status.empty_sources.iter().cloned());
    if check.is_empty() {
        l.push("- none".into());
    } else {
        l.push(format!("- check: {}", check.join(", ")));
    }
    l.push(String::new());
    l.push("</details>".into());

    let mut out = l.join("\n").trim_end().to_string();
    out.push('\n');
    out
}

/// Short status message for a chat notification.
pub fn render_notification(report: &BuildReport, ctx: &ReportContext) -> String {
    let budget = &report.budget;
    let trend = &report.trend;
    let status_line = match report.status.severity {
        Severity::Ok => "🟢 BUILD STATUS: OK",
        Severity::Warning => "🟠 BUILD STATUS: WARNING",
        Severity::Error => "🔴 BUILD STATUS: ERROR",
    };

    let mut l: Vec<String> = vec![
        "📦 KVAS Domains".into(),
        format!("🕒 {}", format_build_time(report.build_time_utc)),
        String::new(),
        status_line.into(),
        String::new(),
        format!(
            "📄 Total: {} / {} ({}%) {}",
            budget.output_lines,
            budget.max_lines,
            budget.usage_pct,
            tier_badge(budget.tier)
        ),
        format!(
            "{} Δ {:+} (avg {}: {})",
            direction_icon(trend.direction),
            trend.delta,
            trend.window,
            trend.rolling_average
        ),
        format!(
            "🔄 +{} / -{}",
            report.diff.output.added.len(),
            report.diff.output.removed.len()
        ),
        format!("🔐 {}", short_hash(&report.content_hash)),
    ];

    let remarks = problems(report);
    if !remarks.is_empty() {
        l.push(String::new());
        l.extend(remarks);
    }
    if let Some(url) = repo_report_url(ctx.repo.as_deref()) {
        l.push(String::new());
        l.push(format!("🔗 {url}"));
    }

    let mut out = l.join("\n");
    out.push('\n');
    out
}

/// Warning list, or an empty string when there is nothing to report.
pub fn render_alert(report: &BuildReport) -> String {
    if report.status.warnings.is_empty() {
        return String::new();
    }
    let mut l = vec![
        "🚨 KVAS Domains — warnings".to_string(),
        format!("🕒 {}", format_build_time(report.build_time_utc)),
        String::new(),
    ];
    l.extend(report.status.warnings.iter().map(|w| format!("• {w}")));
    let mut out = l.join("\n");
    out.push('\n');
    out
}

pub fn render_all(report: &BuildReport, ctx: &ReportContext) -> RenderedReports {
    RenderedReports {
        markdown: render_markdown(report, ctx),
        notification: render_notification(report, ctx),
        alert: render_alert(report),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_hash_abbreviates() {
        assert_eq!(short_hash(""), "—");
        assert_eq!(short_hash("abc"), "abc");
        assert_eq!(short_hash("0123456789abcdef"), "0123…cdef");
    }

    #[test]
    fn build_time_is_rendered_in_msk() {
        let ts: DateTime<Utc> = "2026-01-31T22:30:00Z".parse().unwrap();
        assert_eq!(format_build_time(ts), "01 Feb 2026, 01:30 MSK");
    }

    #[test]
    fn report_url_needs_owner_and_name() {
        assert_eq!(repo_report_url(Some("nope")), None);
        assert_eq!(
            repo_report_url(Some("owner/kvas")).as_deref(),
            Some("https://github.com/owner/kvas/blob/main/dist/report.md")
        );
    }
}
