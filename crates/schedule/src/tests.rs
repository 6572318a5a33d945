//! Tests for the temporal normalizer.

#[cfg(test)]
mod tests {
    use chrono::{DateTime, NaiveDate, TimeZone, Utc};

    use crate::{
        compute_schedule, is_due, parse_calendar_date, parse_delay_hours, parse_time_of_day,
        schedule_after_delay, Schedule, ScheduleError, TimeOfDay, Zone,
    };

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    fn pst() -> Zone {
        Zone::fixed_hours(-8).unwrap()
    }

    fn cst() -> Zone {
        Zone::fixed_hours(8).unwrap()
    }

    // -- parse_calendar_date ------------------------------------------------

    #[test]
    fn serial_date_in_plausible_range() {
        assert_eq!(parse_calendar_date("45658"), Some(date(2025, 1, 1)));
        assert_eq!(parse_calendar_date("45658.75"), Some(date(2025, 1, 1)));
        assert_eq!(parse_calendar_date("1000"), Some(date(1902, 9, 26)));
    }

    #[test]
    fn numbers_outside_serial_range_are_not_serials() {
        assert_eq!(parse_calendar_date("999"), None);
        assert_eq!(parse_calendar_date("0.5"), None);
        // Falls through to the compact textual layout.
        assert_eq!(parse_calendar_date("20250314"), Some(date(2025, 3, 14)));
    }

    #[test]
    fn year_first_dates() {
        assert_eq!(parse_calendar_date("2025-01-05"), Some(date(2025, 1, 5)));
        assert_eq!(parse_calendar_date("2025/1/5"), Some(date(2025, 1, 5)));
        assert_eq!(parse_calendar_date("2025-3-9 00:00:00"), Some(date(2025, 3, 9)));
    }

    #[test]
    fn month_first_dates() {
        assert_eq!(parse_calendar_date("1/5/2025"), Some(date(2025, 1, 5)));
        assert_eq!(parse_calendar_date("12-31-2024"), Some(date(2024, 12, 31)));
    }

    #[test]
    fn impossible_dates_are_none() {
        assert_eq!(parse_calendar_date("2025-02-30"), None);
        assert_eq!(parse_calendar_date("13/01/2025"), None);
    }

    #[test]
    fn textual_fallbacks() {
        assert_eq!(parse_calendar_date("2025年3月8日"), Some(date(2025, 3, 8)));
        assert_eq!(parse_calendar_date("March 8, 2025"), Some(date(2025, 3, 8)));
        assert_eq!(parse_calendar_date("8 Mar 2025"), Some(date(2025, 3, 8)));
        assert_eq!(
            parse_calendar_date("2025-03-08T23:30:00-08:00"),
            Some(date(2025, 3, 8))
        );
    }

    #[test]
    fn empty_or_garbage_date_is_none() {
        assert_eq!(parse_calendar_date(""), None);
        assert_eq!(parse_calendar_date("   "), None);
        assert_eq!(parse_calendar_date("next tuesday"), None);
    }

    // -- parse_time_of_day --------------------------------------------------

    #[test]
    fn fractional_day_serial() {
        assert_eq!(parse_time_of_day("0.375"), TimeOfDay { hours: 9, minutes: 0 });
        assert_eq!(parse_time_of_day("0.5"), TimeOfDay { hours: 12, minutes: 0 });
        assert_eq!(parse_time_of_day("0"), TimeOfDay { hours: 0, minutes: 0 });
    }

    #[test]
    fn fractional_serial_rounding_wraps_past_midnight() {
        // 0.9999 * 1440 = 1439.86 -> 1440 minutes -> 24:00 -> wraps to 00:00
        assert_eq!(parse_time_of_day("0.9999"), TimeOfDay { hours: 0, minutes: 0 });
    }

    #[test]
    fn twenty_four_hour_clock() {
        assert_eq!(parse_time_of_day("09:00"), TimeOfDay { hours: 9, minutes: 0 });
        assert_eq!(parse_time_of_day("9:05:30"), TimeOfDay { hours: 9, minutes: 5 });
        assert_eq!(parse_time_of_day("23:59"), TimeOfDay { hours: 23, minutes: 59 });
    }

    #[test]
    fn twelve_hour_clock() {
        assert_eq!(parse_time_of_day("2:30 PM"), TimeOfDay { hours: 14, minutes: 30 });
        assert_eq!(parse_time_of_day("12:05 am"), TimeOfDay { hours: 0, minutes: 5 });
        assert_eq!(parse_time_of_day("12:00pm"), TimeOfDay { hours: 12, minutes: 0 });
        assert_eq!(parse_time_of_day("11:15 a.m."), TimeOfDay { hours: 11, minutes: 15 });
    }

    #[test]
    fn unparseable_time_is_midnight() {
        assert_eq!(parse_time_of_day(""), TimeOfDay::default());
        assert_eq!(parse_time_of_day("25:00"), TimeOfDay::default());
        assert_eq!(parse_time_of_day("13:00 PM"), TimeOfDay::default());
        assert_eq!(parse_time_of_day("1.5"), TimeOfDay::default());
        assert_eq!(parse_time_of_day("morning"), TimeOfDay::default());
    }

    // -- parse_delay_hours --------------------------------------------------

    #[test]
    fn delay_degrades_to_zero() {
        assert_eq!(parse_delay_hours("2.5"), 2.5);
        assert_eq!(parse_delay_hours("-3"), 0.0);
        assert_eq!(parse_delay_hours("0"), 0.0);
        assert_eq!(parse_delay_hours("soon"), 0.0);
        assert_eq!(parse_delay_hours("inf"), 0.0);
    }

    // -- Zone ---------------------------------------------------------------

    #[test]
    fn fixed_zone_to_absolute_instant() {
        let instant = pst().to_absolute_instant(date(2025, 6, 3), TimeOfDay { hours: 14, minutes: 0 });
        assert_eq!(instant, utc(2025, 6, 3, 22, 0));
    }

    #[test]
    fn fixed_zone_crosses_day_boundary() {
        let instant = cst().to_absolute_instant(date(2025, 1, 1), TimeOfDay { hours: 3, minutes: 15 });
        assert_eq!(instant, utc(2024, 12, 31, 19, 15));
    }

    #[test]
    fn display_uses_target_wall_clock() {
        assert_eq!(cst().display(utc(2025, 6, 3, 22, 0)), "2025-06-04 06:00");
        assert_eq!(Zone::utc().display(utc(2025, 6, 3, 22, 0)), "2025-06-03 22:00");
    }

    #[test]
    fn same_zone_round_trip_reproduces_wall_clock() {
        let zone: Zone = "+05:30".parse().unwrap();
        for (h, m) in [(0, 0), (9, 0), (14, 45), (23, 59)] {
            let instant = zone.to_absolute_instant(date(2025, 4, 10), TimeOfDay { hours: h, minutes: m });
            assert_eq!(zone.display(instant), format!("2025-04-10 {h:02}:{m:02}"));
        }
    }

    #[test]
    fn named_zone_tracks_daylight_saving() {
        let la: Zone = "America/Los_Angeles".parse().unwrap();
        let nine = TimeOfDay { hours: 9, minutes: 0 };
        assert_eq!(la.to_absolute_instant(date(2025, 1, 15), nine), utc(2025, 1, 15, 17, 0));
        assert_eq!(la.to_absolute_instant(date(2025, 7, 1), nine), utc(2025, 7, 1, 16, 0));
    }

    #[test]
    fn named_zone_gap_shifts_forward() {
        let la: Zone = "America/Los_Angeles".parse().unwrap();
        // 02:30 does not exist on 2025-03-09; becomes 03:30 PDT.
        let instant = la.to_absolute_instant(date(2025, 3, 9), TimeOfDay { hours: 2, minutes: 30 });
        assert_eq!(instant, utc(2025, 3, 9, 10, 30));
    }

    #[test]
    fn named_zone_ambiguity_takes_earlier() {
        let la: Zone = "America/Los_Angeles".parse().unwrap();
        // 01:30 happens twice on 2025-11-02; the PDT occurrence comes first.
        let instant = la.to_absolute_instant(date(2025, 11, 2), TimeOfDay { hours: 1, minutes: 30 });
        assert_eq!(instant, utc(2025, 11, 2, 8, 30));
    }

    #[test]
    fn zone_parsing() {
        assert_eq!("-8".parse::<Zone>().unwrap(), pst());
        assert_eq!("+08:00".parse::<Zone>().unwrap(), cst());
        assert_eq!("UTC".parse::<Zone>().unwrap(), Zone::utc());
        assert_eq!("Z".parse::<Zone>().unwrap(), Zone::utc());
        assert_eq!("-0800".parse::<Zone>().unwrap(), pst());
        assert!(matches!("Asia/Shanghai".parse::<Zone>().unwrap(), Zone::Named(_)));
        assert_eq!(
            "Mars/Olympus".parse::<Zone>(),
            Err(ScheduleError::UnknownZone("Mars/Olympus".to_string()))
        );
        assert!(matches!("+30:00".parse::<Zone>(), Err(ScheduleError::OffsetOutOfRange(_))));
    }

    #[test]
    fn zone_serde_uses_display_form() {
        let json = serde_json::to_string(&cst()).unwrap();
        assert_eq!(json, "\"+08:00\"");
        let named: Zone = serde_json::from_str("\"Europe/Berlin\"").unwrap();
        assert_eq!(named.to_string(), "Europe/Berlin");
    }

    // -- compute_schedule ---------------------------------------------------

    #[test]
    fn future_instant_is_scheduled() {
        let now = utc(2025, 6, 1, 0, 0);
        let schedule = compute_schedule("2025-06-03", "14:00", &pst(), &cst(), now);

        assert_eq!(schedule.scheduled_for, utc(2025, 6, 3, 22, 0));
        assert_eq!(schedule.display, "2025-06-04 06:00");
        assert_eq!(schedule.delay_hours, 70.0);
    }

    #[test]
    fn delay_is_rounded_to_two_decimals() {
        let now = utc(2025, 6, 1, 0, 0);
        // 00:20 UTC -> 20 minutes = 0.333.. hours
        let schedule = compute_schedule("2025-06-01", "00:20", &Zone::utc(), &cst(), now);
        assert_eq!(schedule.delay_hours, 0.33);
    }

    #[test]
    fn past_instant_collapses_to_now() {
        let now = utc(2025, 6, 1, 0, 0);
        for (d, t) in [("2025-01-01", "09:00"), ("1999-12-31", "23:59"), ("45000", "0.5")] {
            let schedule = compute_schedule(d, t, &pst(), &cst(), now);
            assert_eq!(schedule, Schedule::immediate(&cst(), now), "input {d} {t}");
            assert_eq!(schedule.delay_hours, 0.0);
        }
    }

    #[test]
    fn instant_equal_to_now_is_immediate() {
        let now = utc(2025, 6, 1, 8, 0);
        let schedule = compute_schedule("2025-06-01", "00:00", &pst(), &cst(), now);
        assert_eq!(schedule.scheduled_for, now);
        assert_eq!(schedule.delay_hours, 0.0);
    }

    #[test]
    fn missing_date_is_immediate_even_with_time() {
        let now = utc(2025, 6, 1, 0, 0);
        let schedule = compute_schedule("", "23:00", &pst(), &cst(), now);
        assert_eq!(schedule.scheduled_for, now);
        assert_eq!(schedule.display, "2025-06-01 08:00");
    }

    #[test]
    fn missing_time_means_midnight_in_source_zone() {
        let now = utc(2025, 6, 1, 0, 0);
        let schedule = compute_schedule("2025-06-02", "", &pst(), &Zone::utc(), now);
        assert_eq!(schedule.scheduled_for, utc(2025, 6, 2, 8, 0));
    }

    #[test]
    fn computation_is_pure() {
        let now = utc(2025, 6, 1, 0, 0);
        let a = compute_schedule("6/10/2025", "2:30 PM", &pst(), &cst(), now);
        let b = compute_schedule("6/10/2025", "2:30 PM", &pst(), &cst(), now);
        assert_eq!(a, b);
    }

    // -- schedule_after_delay / is_due --------------------------------------

    #[test]
    fn explicit_delay_schedules_relative_to_now() {
        let now = utc(2025, 6, 1, 0, 0);
        let schedule = schedule_after_delay(1.5, &Zone::utc(), now).unwrap();
        assert_eq!(schedule.scheduled_for, utc(2025, 6, 1, 1, 30));
        assert_eq!(schedule.delay_hours, 1.5);

        assert_eq!(schedule_after_delay(-2.0, &Zone::utc(), now).unwrap().scheduled_for, now);
        assert_eq!(schedule_after_delay(f64::NAN, &Zone::utc(), now).unwrap().scheduled_for, now);
    }

    #[test]
    fn delay_past_the_time_range_has_no_schedule() {
        let now = utc(2025, 6, 1, 0, 0);
        assert_eq!(schedule_after_delay(1e15, &Zone::utc(), now), None);
        assert_eq!(schedule_after_delay(1e30, &Zone::utc(), now), None);
        assert!(schedule_after_delay(24.0 * 365.0 * 100.0, &Zone::utc(), now).is_some());
    }

    #[test]
    fn due_is_inclusive_of_now() {
        let now = utc(2025, 6, 1, 0, 0);
        assert!(is_due(now, now));
        assert!(is_due(utc(2025, 5, 31, 23, 59), now));
        assert!(!is_due(utc(2025, 6, 1, 0, 1), now));
    }
}
