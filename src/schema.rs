// Kept in sync with the CREATE TABLE statements in repository::records.

diesel::table! {
    records (id) {
        id -> BigInt,
        source_id -> Text,
        url -> Text,
        fields -> Text,
        fingerprint -> Text,
        captured_at -> Text,
        stored_at -> Text,
    }
}

diesel::table! {
    change_log (id) {
        id -> BigInt,
        source_id -> Text,
        change_type -> Text,
        old_fingerprint -> Nullable<Text>,
        new_fingerprint -> Text,
        record_id -> BigInt,
        changed_at -> Text,
    }
}

diesel::allow_tables_to_appear_in_same_query!(records, change_log);
