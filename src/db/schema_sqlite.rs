diesel::table! {
    channels (id) {
        id -> BigInt,
        username -> Text,
        created_at -> Text,
        updated_at -> Text,
    }
}

diesel::table! {
    messages (id) {
        id -> Integer,
        sequence_id -> BigInt,
        group_id -> Nullable<BigInt>,
        channel_id -> BigInt,
        content_hash -> Binary,
        created_at -> Text,
    }
}

diesel::joinable!(messages -> channels (channel_id));

diesel::allow_tables_to_appear_in_same_query!(channels, messages);
