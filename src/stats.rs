use crate::dates::{is_wednesday, meeting_dates_of};
use crate::models::{
    AttendanceData, MemberRecord, MemberReport, MemberStats, MonthlyReport, ReportSummary,
};
use crate::roster::EXTRA_PREFIX;

/// Role exempt from attendance requirements.
pub const ADMIN_ROLE: &str = "admin-tier";

/// Minimum attendance a role must reach in a month.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Requirement {
    pub total: u32,
    pub wednesday: u32,
}

pub fn requirement_for(role: &str) -> Requirement {
    let (total, wednesday) = match role {
        ADMIN_ROLE => (0, 0),
        "pacer" => (3, 0),
        "pacer-gangnam" => (3, 2),
        "photo" => (1, 0),
        _ => (0, 0),
    };
    Requirement { total, wednesday }
}

pub fn monthly_stats(data: &AttendanceData, year: i32, month: u32, name: &str) -> MemberStats {
    match data.roster(year, month).and_then(|roster| roster.get(name)) {
        Some(member) => member_stats(member, &meeting_dates_of(year, month)),
        None => MemberStats::default(),
    }
}

fn member_stats(member: &MemberRecord, dates: &[String]) -> MemberStats {
    let attended: Vec<&String> = dates
        .iter()
        .filter(|date| member.attendance.get(*date) == Some(&1))
        .collect();
    let regular = attended.len() as u32;
    let wednesday = attended.iter().filter(|date| is_wednesday(date)).count() as u32;
    let extra = member
        .extra_attendance
        .iter()
        .filter(|(key, value)| key.starts_with(EXTRA_PREFIX) && **value == 1)
        .count() as u32;
    let total = regular + extra;

    let required = requirement_for(&member.role);
    let meets_requirement = member.role == ADMIN_ROLE
        || (total >= required.total && wednesday >= required.wednesday);

    MemberStats {
        regular,
        wednesday,
        extra,
        total,
        required_total: required.total,
        required_wednesday: required.wednesday,
        meets_requirement,
    }
}

/// Members sorted by display order (stable, so ties keep insertion order) with their stats.
pub fn build_monthly_report(data: &AttendanceData, year: i32, month: u32) -> MonthlyReport {
    let dates = meeting_dates_of(year, month);

    let mut members: Vec<MemberReport> = data
        .roster(year, month)
        .map(|roster| {
            roster
                .iter()
                .map(|(name, member)| MemberReport {
                    name: name.clone(),
                    role: member.role.clone(),
                    order: member.order,
                    attendance: member.attendance.clone(),
                    extra_attendance: member.extra_attendance.clone(),
                    stats: member_stats(member, &dates),
                })
                .collect()
        })
        .unwrap_or_default();
    members.sort_by_key(|member| member.order);

    let summary = ReportSummary {
        total_members: members.len(),
        meeting_count: dates.len(),
        meeting_requirement: members
            .iter()
            .filter(|member| member.stats.meets_requirement)
            .count(),
    };

    MonthlyReport {
        year,
        month,
        dates,
        members,
        summary,
    }
}
