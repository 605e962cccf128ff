diesel::table! {
    departments (id) {
        id -> Uuid,
        name -> Varchar,
    }
}

diesel::table! {
    services (id) {
        id -> Uuid,
        name -> Varchar,
        department_id -> Uuid,
    }
}

diesel::table! {
    schools (id) {
        id -> Uuid,
        name -> Varchar,
        school_id_code -> Nullable<Varchar>,
    }
}

diesel::table! {
    users (id) {
        id -> Uuid,
        email -> Varchar,
        name -> Varchar,
        password_hash -> Nullable<Varchar>,
        role -> Varchar,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    user_services (user_id, service_id) {
        user_id -> Uuid,
        service_id -> Uuid,
    }
}

diesel::table! {
    tickets (id) {
        id -> Uuid,
        ticket_number -> Varchar,
        status -> Varchar,
        date_posted -> Timestamptz,
        requester_name -> Varchar,
        requester_email -> Varchar,
        requester_contact -> Nullable<Varchar>,
        details -> Jsonb,
        department_id -> Uuid,
        service_id -> Uuid,
        school_id -> Nullable<Uuid>,
        assigned_staff_id -> Nullable<Uuid>,
    }
}

diesel::table! {
    attachments (id) {
        id -> Uuid,
        filename -> Varchar,
        ticket_id -> Uuid,
    }
}

diesel::table! {
    ticket_responses (id) {
        id -> Uuid,
        body -> Text,
        is_internal -> Bool,
        date_posted -> Timestamptz,
        user_id -> Nullable<Uuid>,
        ticket_id -> Uuid,
    }
}

diesel::table! {
    canned_responses (id) {
        id -> Uuid,
        title -> Varchar,
        body -> Text,
        department_id -> Uuid,
        service_id -> Nullable<Uuid>,
    }
}

diesel::table! {
    personal_canned_responses (id) {
        id -> Uuid,
        title -> Varchar,
        body -> Text,
        user_id -> Uuid,
    }
}

diesel::table! {
    authorized_emails (id) {
        id -> Uuid,
        email -> Varchar,
    }
}

diesel::joinable!(services -> departments (department_id));
diesel::joinable!(user_services -> users (user_id));
diesel::joinable!(user_services -> services (service_id));
diesel::joinable!(tickets -> services (service_id));
diesel::joinable!(attachments -> tickets (ticket_id));
diesel::joinable!(ticket_responses -> tickets (ticket_id));
diesel::joinable!(canned_responses -> departments (department_id));
diesel::joinable!(personal_canned_responses -> users (user_id));

diesel::allow_tables_to_appear_in_same_query!(
    departments,
    services,
    schools,
    users,
    user_services,
    tickets,
    attachments,
    ticket_responses,
    canned_responses,
    personal_canned_responses,
    authorized_emails,
);
