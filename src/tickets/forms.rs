//! Service request forms.
//!
//! Every known service maps to one [`ServiceForm`]; anything else falls back
//! to [`ServiceForm::General`]. A form is a list of [`FieldSpec`]s on top of the
//! requester fields every ticket carries, and [`validate`] turns a submission
//! into the ticket's requester columns plus its JSON detail object.

use chrono::{NaiveDate, NaiveTime};
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use uuid::Uuid;
use validator::ValidateEmail;

pub const OTHER: &str = "Other";
const OTHER_SUFFIX: &str = "_other";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text { min: usize, max: usize },
    TextArea { min: usize, max: usize },
    Email,
    Select(&'static [&'static str]),
    Date,
    Time,
    Amount,
    File,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub label: &'static str,
    pub kind: FieldKind,
    pub required: bool,
}

impl FieldSpec {
    const fn new(name: &'static str, label: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            label,
            kind,
            required: true,
        }
    }

    pub const fn text(name: &'static str, label: &'static str, min: usize, max: usize) -> Self {
        Self::new(name, label, FieldKind::Text { min, max })
    }

    pub const fn textarea(name: &'static str, label: &'static str, min: usize, max: usize) -> Self {
        Self::new(name, label, FieldKind::TextArea { min, max })
    }

    pub const fn select(name: &'static str, label: &'static str, choices: &'static [&'static str]) -> Self {
        Self::new(name, label, FieldKind::Select(choices))
    }

    pub const fn date(name: &'static str, label: &'static str) -> Self {
        Self::new(name, label, FieldKind::Date)
    }

    pub const fn time(name: &'static str, label: &'static str) -> Self {
        Self::new(name, label, FieldKind::Time)
    }

    pub const fn amount(name: &'static str, label: &'static str) -> Self {
        Self::new(name, label, FieldKind::Amount)
    }

    pub const fn file(name: &'static str, label: &'static str) -> Self {
        Self::new(name, label, FieldKind::File)
    }

    /// Free-text companion of a select that offers "Other".
    pub const fn other(name: &'static str, label: &'static str) -> Self {
        Self::text(name, label, 0, 150).optional()
    }

    pub const fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    pub fn is_file(&self) -> bool {
        matches!(self.kind, FieldKind::File)
    }

    /// `<base>` when this is a `<base>_other` companion field.
    pub fn other_base(&self) -> Option<&'static str> {
        self.name.strip_suffix(OTHER_SUFFIX)
    }
}

pub const REQUESTER_NAME: FieldSpec = FieldSpec::text("requester_name", "Full Name", 2, 100);
pub const REQUESTER_EMAIL: FieldSpec = FieldSpec::new("requester_email", "DepEd Email Address", FieldKind::Email);
pub const REQUESTER_CONTACT: FieldSpec = FieldSpec::text("requester_contact", "Contact Number", 7, 15);
pub const SCHOOL_FIELD: &str = "school";

pub fn requester_fields() -> [FieldSpec; 3] {
    [REQUESTER_NAME, REQUESTER_EMAIL, REQUESTER_CONTACT]
}

const MATERIAL_TYPES: &[&str] = &["Memorandum", "Advisory", "Order", "Learning Material", OTHER];
const EQUIPMENT_TYPES: &[&str] = &[
    "Desktop Computer",
    "Laptop",
    "Printer",
    "Projector",
    "Network Device",
    OTHER,
];
const EMAIL_REQUESTS: &[&str] = &[
    "New Account",
    "Password Reset",
    "Account Recovery",
    "Update Account Information",
];
const DPDS_CONCERNS: &[&str] = &["Account Access", "Data Encoding", "Report Generation", OTHER];
const DCP_EQUIPMENT: &[&str] = &["Laptop", "Desktop", "Tablet", "Projector", "Smart TV", OTHER];
const LEAVE_TYPES: &[&str] = &[
    "Vacation Leave",
    "Sick Leave",
    "Maternity Leave",
    "Paternity Leave",
    "Special Privilege Leave",
    "Solo Parent Leave",
    "Study Leave",
    OTHER,
];
const COE_PURPOSES: &[&str] = &["Loan Application", "Employment Abroad", "Scholarship", OTHER];
const YES_NO: &[&str] = &["Yes", "No"];
const GSIS_REQUESTS: &[&str] = &["New BP Number", "Verification of BP Number", "Update of Records"];
const CLEARANCE_PURPOSES: &[&str] = &[
    "Promotion",
    "Retirement",
    "Travel Abroad",
    "Loan Application",
    OTHER,
];
const GRADE_LEVELS: &[&str] = &[
    "Kindergarten",
    "Grade 1",
    "Grade 2",
    "Grade 3",
    "Grade 4",
    "Grade 5",
    "Grade 6",
    "Grade 7",
    "Grade 8",
    "Grade 9",
    "Grade 10",
    "Grade 11",
    "Grade 12",
];
const ADM_MODALITIES: &[&str] = &["Modular Print", "Modular Digital", "Online", "Blended", OTHER];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceForm {
    General,
    Issuance,
    Repair,
    EmailAccount,
    Dpds,
    Dcp,
    OtherIct,
    LeaveApplication,
    Coe,
    ServiceRecord,
    Gsis,
    NoPendingCase,
    LocatorSlip,
    AuthorityToTravel,
    OicDesignation,
    SubstituteTeacher,
    Adm,
    ProvidentFund,
    Ics,
}

impl ServiceForm {
    /// Service name each dedicated form is registered under.
    pub const REGISTRY: [(&'static str, ServiceForm); 18] = [
        ("Issuances and Online Materials", Self::Issuance),
        ("Repair, Maintenance and Troubleshoot of IT Equipment", Self::Repair),
        ("DepEd Email Account", Self::EmailAccount),
        ("DPDS - DepEd Partnership Database System", Self::Dpds),
        ("DCP - DepEd Computerization Program: After-sales", Self::Dcp),
        ("other ICT - Technical Assistance Needed", Self::OtherIct),
        ("Application for Leave of Absence", Self::LeaveApplication),
        ("Certificate of Employment", Self::Coe),
        ("Service Record", Self::ServiceRecord),
        ("GSIS BP Number", Self::Gsis),
        ("Certificate of NO-Pending Case", Self::NoPendingCase),
        ("Request for Approval of Locator Slip", Self::LocatorSlip),
        ("Request for Approval of Authority to Travel", Self::AuthorityToTravel),
        (
            "Request for Designation of Officer-in-Charge at the School",
            Self::OicDesignation,
        ),
        ("Request for Substitute Teacher", Self::SubstituteTeacher),
        ("Alternative Delivery Mode", Self::Adm),
        ("DepEd TCSD Provident Fund", Self::ProvidentFund),
        ("Submission of Inventory Custodian Slip \u{2013} ICS", Self::Ics),
    ];

    pub fn for_service_name(name: &str) -> Self {
        let name = name.trim();
        Self::REGISTRY
            .iter()
            .find(|(registered, _)| *registered == name)
            .map(|(_, form)| *form)
            .unwrap_or(Self::General)
    }

    pub fn fields(&self) -> Vec<FieldSpec> {
        match self {
            Self::General => vec![FieldSpec::textarea(
                "request_details",
                "Describe Your Request",
                10,
                2000,
            )],
            Self::Issuance => vec![
                FieldSpec::text("material_title", "Title of Issuance / Material", 2, 200),
                FieldSpec::select("material_type", "Type of Material", MATERIAL_TYPES),
                FieldSpec::other("material_type_other", "If Other, please specify"),
                FieldSpec::date("publication_date", "Date of Issuance"),
                FieldSpec::text("reference_link", "Link or Reference No.", 0, 255).optional(),
                FieldSpec::file("material_file", "Attach Material").optional(),
            ],
            Self::Repair => vec![
                FieldSpec::select("equipment_type", "Type of Equipment", EQUIPMENT_TYPES),
                FieldSpec::other("equipment_type_other", "If Other, please specify"),
                FieldSpec::text("brand_model", "Brand / Model", 2, 100),
                FieldSpec::text("serial_number", "Serial / Property Number", 0, 100).optional(),
                FieldSpec::textarea("problem_description", "Describe the Problem", 10, 2000),
            ],
            Self::EmailAccount => vec![
                FieldSpec::select("request_type", "Type of Request", EMAIL_REQUESTS),
                FieldSpec::text("position", "Position / Designation", 2, 100),
                FieldSpec::text("employee_number", "Employee Number", 0, 20).optional(),
            ],
            Self::Dpds => vec![
                FieldSpec::select("concern", "Concern", DPDS_CONCERNS),
                FieldSpec::other("concern_other", "If Other, please specify"),
                FieldSpec::textarea("description", "Details of the Concern", 10, 2000),
            ],
            Self::Dcp => vec![
                FieldSpec::text("dcp_batch", "DCP Batch / Year Received", 1, 50),
                FieldSpec::select("equipment", "Equipment", DCP_EQUIPMENT),
                FieldSpec::other("equipment_other", "If Other, please specify"),
                FieldSpec::text("serial_number", "Serial Number", 1, 100),
                FieldSpec::textarea("issue_description", "Describe the Issue", 10, 2000),
            ],
            Self::OtherIct => vec![FieldSpec::textarea(
                "assistance_needed",
                "Technical Assistance Needed",
                10,
                2000,
            )],
            Self::LeaveApplication => vec![
                FieldSpec::select("leave_type", "Type of Leave", LEAVE_TYPES),
                FieldSpec::other("leave_type_other", "If Other, please specify"),
                FieldSpec::date("start_date", "Start Date"),
                FieldSpec::date("end_date", "End Date"),
                FieldSpec::textarea("reason", "Reason", 0, 1000).optional(),
                FieldSpec::file("leave_form", "Accomplished Leave Form (CS Form No. 6)"),
            ],
            Self::Coe => vec![
                FieldSpec::select("purpose", "Purpose", COE_PURPOSES),
                FieldSpec::other("purpose_other", "If Other, please specify"),
                FieldSpec::select("with_compensation", "Include Compensation Details?", YES_NO),
                FieldSpec::text("employee_number", "Employee Number", 0, 20).optional(),
            ],
            Self::ServiceRecord => vec![
                FieldSpec::text("purpose", "Purpose", 2, 200),
                FieldSpec::text("employee_number", "Employee Number", 0, 20).optional(),
            ],
            Self::Gsis => vec![
                FieldSpec::select("request_type", "Type of Request", GSIS_REQUESTS),
                FieldSpec::text("bp_number", "Existing BP Number", 0, 20).optional(),
                FieldSpec::date("birth_date", "Date of Birth"),
            ],
            Self::NoPendingCase => vec![
                FieldSpec::select("purpose", "Purpose", CLEARANCE_PURPOSES),
                FieldSpec::other("purpose_other", "If Other, please specify"),
            ],
            Self::LocatorSlip => vec![
                FieldSpec::text("destination", "Destination", 2, 200),
                FieldSpec::textarea("purpose", "Purpose of Travel", 5, 500),
                FieldSpec::date("travel_date", "Date"),
                FieldSpec::time("time_out", "Time Out"),
                FieldSpec::time("time_in", "Expected Time In"),
                FieldSpec::file("locator_slip_file", "Signed Locator Slip").optional(),
            ],
            Self::AuthorityToTravel => vec![
                FieldSpec::text("destination", "Destination", 2, 200),
                FieldSpec::textarea("purpose", "Purpose of Travel", 5, 500),
                FieldSpec::date("start_date", "Departure Date"),
                FieldSpec::date("end_date", "Return Date"),
                FieldSpec::file("travel_document", "Invitation / Supporting Document").optional(),
            ],
            Self::OicDesignation => vec![
                FieldSpec::text("oic_name", "Name of Proposed OIC", 2, 100),
                FieldSpec::text("oic_position", "Position of Proposed OIC", 2, 100),
                FieldSpec::date("start_date", "Start Date"),
                FieldSpec::date("end_date", "End Date"),
                FieldSpec::textarea("reason", "Reason for Designation", 5, 1000),
            ],
            Self::SubstituteTeacher => vec![
                FieldSpec::text("teacher_on_leave", "Teacher on Leave", 2, 100),
                FieldSpec::text("substitute_name", "Proposed Substitute Teacher", 2, 100),
                FieldSpec::date("start_date", "Start Date"),
                FieldSpec::date("end_date", "End Date"),
                FieldSpec::textarea("reason", "Reason", 5, 1000),
            ],
            Self::Adm => vec![
                FieldSpec::select("grade_level", "Grade Level", GRADE_LEVELS),
                FieldSpec::select("modality", "Proposed Modality", ADM_MODALITIES),
                FieldSpec::other("modality_other", "If Other, please specify"),
                FieldSpec::textarea("justification", "Justification", 10, 2000),
                FieldSpec::file("adm_document", "Supporting Document").optional(),
            ],
            Self::ProvidentFund => vec![
                FieldSpec::amount("loan_amount", "Loan Amount (PHP)"),
                FieldSpec::textarea("purpose", "Purpose of Loan", 5, 500),
                FieldSpec::file("application_form", "Accomplished Application Form"),
            ],
            Self::Ics => vec![
                FieldSpec::text("ics_number", "ICS Number", 1, 50),
                FieldSpec::textarea("item_description", "Description of Items", 5, 1000),
                FieldSpec::file("ics_file", "Inventory Custodian Slip"),
            ],
        }
    }

    /// `(start, end)` date pairs where the end may not precede the start.
    pub fn date_ranges(&self) -> &'static [(&'static str, &'static str)] {
        match self {
            Self::LeaveApplication
            | Self::AuthorityToTravel
            | Self::OicDesignation
            | Self::SubstituteTeacher => &[("start_date", "end_date")],
            _ => &[],
        }
    }

    pub fn file_fields(&self) -> Vec<FieldSpec> {
        self.fields().into_iter().filter(FieldSpec::is_file).collect()
    }
}

/// Raw form input: text values plus the names of file fields that carried a
/// non-empty upload.
#[derive(Debug, Clone, Default)]
pub struct TicketSubmission {
    pub values: HashMap<String, String>,
    pub files: HashSet<String>,
}

impl TicketSubmission {
    pub fn value(&self, name: &str) -> &str {
        self.values.get(name).map(|v| v.trim()).unwrap_or("")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedTicketForm {
    pub requester_name: String,
    pub requester_email: String,
    pub requester_contact: String,
    pub school_id: Uuid,
    pub details: Value,
}

pub fn parse_date(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d").ok()
}

fn parse_time(value: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(value, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M:%S"))
        .ok()
}

fn check_field(spec: &FieldSpec, value: &str, errors: &mut Vec<FieldError>) {
    if value.is_empty() {
        if spec.required {
            errors.push(FieldError::new(spec.name, "This field is required."));
        }
        return;
    }

    let chars = value.chars().count();
    match spec.kind {
        FieldKind::Text { min, max } | FieldKind::TextArea { min, max } => {
            if chars < min || chars > max {
                errors.push(FieldError::new(
                    spec.name,
                    format!("Field must be between {min} and {max} characters long."),
                ));
            }
        }
        FieldKind::Email => {
            if !value.validate_email() {
                errors.push(FieldError::new(spec.name, "Invalid email address."));
            }
        }
        FieldKind::Select(choices) => {
            if !choices.contains(&value) {
                errors.push(FieldError::new(spec.name, "Not a valid choice."));
            }
        }
        FieldKind::Date => {
            if parse_date(value).is_none() {
                errors.push(FieldError::new(spec.name, "Not a valid date value."));
            }
        }
        FieldKind::Time => {
            if parse_time(value).is_none() {
                errors.push(FieldError::new(spec.name, "Not a valid time value."));
            }
        }
        FieldKind::Amount => match value.replace(',', "").parse::<f64>() {
            Ok(amount) if amount > 0.0 && amount.is_finite() => {}
            _ => errors.push(FieldError::new(spec.name, "Enter a positive amount.")),
        },
        FieldKind::File => {}
    }
}

fn detail_value(spec: &FieldSpec, value: &str) -> Value {
    match spec.kind {
        FieldKind::Date => parse_date(value)
            .map(|d| Value::String(d.format("%Y-%m-%d").to_string()))
            .unwrap_or(Value::Null),
        FieldKind::Time => parse_time(value)
            .map(|t| Value::String(t.format("%H:%M").to_string()))
            .unwrap_or(Value::Null),
        FieldKind::Amount => Value::String(value.replace(',', "")),
        _ => Value::String(value.to_string()),
    }
}

/// Validates a submission against `form`. `schools` are the ids a requester
/// may pick.
pub fn validate(
    form: ServiceForm,
    submission: &TicketSubmission,
    schools: &HashSet<Uuid>,
) -> Result<ValidatedTicketForm, Vec<FieldError>> {
    let mut errors = Vec::new();

    for spec in requester_fields() {
        check_field(&spec, submission.value(spec.name), &mut errors);
    }

    let school_id = match submission.value(SCHOOL_FIELD) {
        "" => {
            errors.push(FieldError::new(SCHOOL_FIELD, "This field is required."));
            None
        }
        raw => match Uuid::parse_str(raw).ok().filter(|id| schools.contains(id)) {
            Some(id) => Some(id),
            None => {
                errors.push(FieldError::new(SCHOOL_FIELD, "Not a valid choice."));
                None
            }
        },
    };

    let fields = form.fields();
    let mut details = Map::new();

    for spec in &fields {
        if spec.is_file() {
            if spec.required && !submission.files.contains(spec.name) {
                errors.push(FieldError::new(spec.name, "This field is required."));
            }
            continue;
        }

        let value = submission.value(spec.name);

        if let Some(base) = spec.other_base() {
            if submission.value(base) == OTHER && value.is_empty() {
                errors.push(FieldError::new(
                    spec.name,
                    "Please specify when selecting \"Other\".",
                ));
                continue;
            }
        }

        check_field(spec, value, &mut errors);
        let stored = if value.is_empty() {
            match spec.kind {
                FieldKind::Date | FieldKind::Time => Value::Null,
                _ => Value::String(String::new()),
            }
        } else {
            detail_value(spec, value)
        };
        details.insert(spec.name.to_string(), stored);
    }

    for (start, end) in form.date_ranges() {
        if let (Some(s), Some(e)) = (
            parse_date(submission.value(start)),
            parse_date(submission.value(end)),
        ) {
            if e < s {
                errors.push(FieldError::new(
                    end,
                    "End date cannot be earlier than the start date.",
                ));
            }
        }
    }

    match (errors.is_empty(), school_id) {
        (true, Some(school_id)) => Ok(ValidatedTicketForm {
            requester_name: submission.value(REQUESTER_NAME.name).to_string(),
            requester_email: submission.value(REQUESTER_EMAIL.name).to_lowercase(),
            requester_contact: submission.value(REQUESTER_CONTACT.name).to_string(),
            school_id,
            details: Value::Object(details),
        }),
        _ => Err(errors),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn submission(pairs: &[(&str, &str)], school: Uuid) -> TicketSubmission {
        let mut values: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        values.insert("requester_name".into(), "Maria Santos".into());
        values.insert("requester_email".into(), "Maria.Santos@deped.gov.ph".into());
        values.insert("requester_contact".into(), "09171234567".into());
        values.insert("school".into(), school.to_string());
        TicketSubmission {
            values,
            files: HashSet::new(),
        }
    }

    fn schools(id: Uuid) -> HashSet<Uuid> {
        HashSet::from([id])
    }

    fn error_fields(errors: &[FieldError]) -> Vec<&str> {
        errors.iter().map(|e| e.field.as_str()).collect()
    }

    #[test]
    fn test_registry_dispatch() {
        assert_eq!(
            ServiceForm::for_service_name("Application for Leave of Absence"),
            ServiceForm::LeaveApplication
        );
        assert_eq!(
            ServiceForm::for_service_name("Submission of Inventory Custodian Slip \u{2013} ICS"),
            ServiceForm::Ics
        );
        assert_eq!(
            ServiceForm::for_service_name("Something Brand New"),
            ServiceForm::General
        );
        let forms: HashSet<_> = ServiceForm::REGISTRY.iter().map(|(_, f)| *f).collect();
        assert_eq!(forms.len(), ServiceForm::REGISTRY.len());
    }

    #[test]
    fn test_every_other_companion_has_a_base_with_other_choice() {
        for (_, form) in ServiceForm::REGISTRY {
            let fields = form.fields();
            for spec in fields.iter().filter(|f| f.other_base().is_some()) {
                let base = spec.other_base().expect("base");
                let base_spec = fields
                    .iter()
                    .find(|f| f.name == base)
                    .expect("base field exists");
                match base_spec.kind {
                    FieldKind::Select(choices) => assert!(choices.contains(&OTHER)),
                    other => panic!("{base} is {other:?}"),
                }
            }
        }
    }

    #[test]
    fn test_valid_repair_submission() {
        let school = Uuid::new_v4();
        let sub = submission(
            &[
                ("equipment_type", "Laptop"),
                ("brand_model", "Lenovo ThinkPad"),
                ("problem_description", "Screen flickers when charging"),
            ],
            school,
        );
        let form = validate(ServiceForm::Repair, &sub, &schools(school)).expect("valid");
        assert_eq!(form.requester_email, "maria.santos@deped.gov.ph");
        assert_eq!(form.school_id, school);
        assert_eq!(form.details["equipment_type"], "Laptop");
        assert_eq!(form.details["equipment_type_other"], "");
        assert_eq!(form.details["serial_number"], "");
        assert!(form.details.get("requester_name").is_none());
    }

    #[test]
    fn test_other_requires_companion() {
        let school = Uuid::new_v4();
        let sub = submission(
            &[
                ("equipment_type", "Other"),
                ("brand_model", "Generic"),
                ("problem_description", "Does not power on at all"),
            ],
            school,
        );
        let errors = validate(ServiceForm::Repair, &sub, &schools(school)).expect_err("invalid");
        assert_eq!(error_fields(&errors), vec!["equipment_type_other"]);
    }

    #[test]
    fn test_requester_field_rules() {
        let school = Uuid::new_v4();
        let mut sub = submission(&[("request_details", "Please help with my request")], school);
        sub.values.insert("requester_name".into(), "M".into());
        sub.values.insert("requester_email".into(), "not-an-email".into());
        sub.values.insert("requester_contact".into(), "123".into());
        sub.values.insert("school".into(), Uuid::new_v4().to_string());
        let errors = validate(ServiceForm::General, &sub, &schools(school)).expect_err("invalid");
        assert_eq!(
            error_fields(&errors),
            vec!["requester_name", "requester_email", "requester_contact", "school"]
        );
    }

    #[test]
    fn test_leave_dates_and_required_file() {
        let school = Uuid::new_v4();
        let mut sub = submission(
            &[
                ("leave_type", "Sick Leave"),
                ("start_date", "2025-06-10"),
                ("end_date", "2025-06-09"),
            ],
            school,
        );
        let errors =
            validate(ServiceForm::LeaveApplication, &sub, &schools(school)).expect_err("invalid");
        assert_eq!(error_fields(&errors), vec!["leave_form", "end_date"]);

        sub.values.insert("end_date".into(), "2025-06-12".into());
        sub.files.insert("leave_form".into());
        let form = validate(ServiceForm::LeaveApplication, &sub, &schools(school)).expect("valid");
        assert_eq!(form.details["start_date"], "2025-06-10");
        assert!(form.details.get("leave_form").is_none());
    }

    #[test]
    fn test_select_membership_and_date_shape() {
        let school = Uuid::new_v4();
        let sub = submission(
            &[("request_type", "Teleport"), ("birth_date", "06/10/1990")],
            school,
        );
        let errors = validate(ServiceForm::Gsis, &sub, &schools(school)).expect_err("invalid");
        assert_eq!(error_fields(&errors), vec!["request_type", "birth_date"]);
    }

    #[test]
    fn test_amount_and_time_fields() {
        let school = Uuid::new_v4();
        let sub = submission(
            &[
                ("loan_amount", "-5"),
                ("purpose", "House repair"),
            ],
            school,
        );
        let errors = validate(ServiceForm::ProvidentFund, &sub, &schools(school)).expect_err("invalid");
        assert_eq!(error_fields(&errors), vec!["loan_amount", "application_form"]);

        let mut sub = submission(
            &[
                ("destination", "Division Office"),
                ("purpose", "Submit reports"),
                ("travel_date", "2025-02-03"),
                ("time_out", "13:30"),
                ("time_in", "16:00:00"),
            ],
            school,
        );
        let form = validate(ServiceForm::LocatorSlip, &sub, &schools(school)).expect("valid");
        assert_eq!(form.details["time_in"], "16:00");
        sub.values.insert("time_out".into(), "1:30 PM".into());
        assert!(validate(ServiceForm::LocatorSlip, &sub, &schools(school)).is_err());
    }
}
