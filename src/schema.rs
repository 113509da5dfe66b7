diesel::table! {
    accounts (id) {
        id -> Uuid,
        balance -> Numeric,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    interest_logs (id) {
        id -> Uuid,
        account_id -> Uuid,
        calculation_date -> Date,
        principal_balance -> Numeric,
        interest_amount -> Numeric,
        new_balance -> Numeric,
        annual_rate -> Numeric,
        days_in_year -> Int4,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    ledgers (id) {
        id -> Uuid,
        wallet_id -> Uuid,
        transaction_log_id -> Uuid,
        #[max_length = 8]
        entry_type -> Varchar,
        amount -> Numeric,
        balance_before -> Numeric,
        balance_after -> Numeric,
        description -> Nullable<Text>,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    transaction_logs (id) {
        id -> Uuid,
        #[max_length = 255]
        idempotency_key -> Varchar,
        from_wallet_id -> Uuid,
        to_wallet_id -> Uuid,
        amount -> Numeric,
        #[max_length = 16]
        status -> Varchar,
        error_message -> Nullable<Text>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    wallets (id) {
        id -> Uuid,
        balance -> Numeric,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::joinable!(interest_logs -> accounts (account_id));
diesel::joinable!(ledgers -> transaction_logs (transaction_log_id));
diesel::joinable!(ledgers -> wallets (wallet_id));

diesel::allow_tables_to_appear_in_same_query!(
    accounts,
    interest_logs,
    ledgers,
    transaction_logs,
    wallets,
);
