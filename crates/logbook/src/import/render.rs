//! HTML fragments for the import report.
//!
//! Every row renders as a table row whose cells are classed by field name.
//! Commit mode appends a banner row telling whether the line was stored.

use std::fmt::Write;

use super::classify::Fields;
use super::handlers::Section;
use crate::error::FieldErrors;

/// Flight columns shown in a preview, with their column heading.
pub const FLIGHT_COLUMNS: &[(&str, &str)] = &[
    ("date", "Date"),
    ("tailnumber", "Tail"),
    ("type", "Type"),
    ("route", "Route"),
    ("total", "Total"),
    ("pic", "PIC"),
    ("solo", "Solo"),
    ("sic", "SIC"),
    ("dual_r", "Dual R"),
    ("dual_g", "Dual G"),
    ("xc", "XC"),
    ("act_inst", "Act Inst"),
    ("sim_inst", "Sim Inst"),
    ("night", "Night"),
    ("day_l", "Day L"),
    ("night_l", "Night L"),
    ("app", "App"),
    ("person", "Person"),
    ("flight_number", "Flight #"),
    ("remarks", "Remarks"),
];

const PLANE_COLUMNS: &[(&str, &str)] = &[
    ("tailnumber", "Registration"),
    ("type", "Type"),
    ("manufacturer", "Manufacturer"),
    ("model", "Model"),
    ("cat_class", "Category/Class"),
    ("tags", "Tags"),
];

const NON_FLIGHT_COLUMNS: &[(&str, &str)] = &[
    ("date", "Date"),
    ("non_flying", "Type"),
    ("remarks", "Remarks"),
];

const RECORDS_COLUMNS: &[(&str, &str)] = &[("records", "Records")];

/// Width of a banner row; wide enough to span every flight column.
const BANNER_SPAN: usize = 20;

fn columns(section: Section) -> &'static [(&'static str, &'static str)] {
    match section {
        Section::Flight => FLIGHT_COLUMNS,
        Section::NonFlight => NON_FLIGHT_COLUMNS,
        Section::Records => RECORDS_COLUMNS,
        Section::Plane => PLANE_COLUMNS,
    }
}

/// Escape text for use inside an element or a quoted attribute.
#[must_use]
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            _ => out.push(ch),
        }
    }
    out
}

/// Heading row for `section`.
#[must_use]
pub fn header(section: Section) -> String {
    let mut out = String::from("<tr class=\"header\">");
    for (_, heading) in columns(section) {
        let _ = write!(out, "<td>{}</td>", escape(heading));
    }
    out.push_str("</tr>");
    out
}

/// Display row for one line of `section`.
#[must_use]
pub fn row(section: Section, fields: &Fields) -> String {
    let mut out = String::from("<tr>");
    for (name, _) in columns(section) {
        let _ = write!(out, "<td class='{name}'>{}</td>", escape(fields.get(name)));
    }
    out.push_str("</tr>");
    out
}

/// Banner for a line that was stored.
#[must_use]
pub fn good_banner() -> String {
    format!("<tr class='good'><td colspan='{BANNER_SPAN}'>Line entered successfully</td></tr>")
}

/// Banner for a line that was rejected, listing why.
#[must_use]
pub fn bad_banner(errors: &FieldErrors) -> String {
    format!(
        "<tr class='bad'><td colspan='{BANNER_SPAN}'>The above line did not get entered \
         because it had an error:<br>{}</td></tr>",
        errors.to_html()
    )
}
