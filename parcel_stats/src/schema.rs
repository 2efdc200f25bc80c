//! Diesel table definitions, maintained by hand alongside `migrations/`.
//! SQLite `INTEGER` keys are 64-bit, so they map to `BigInt`.

diesel::table! {
    current_carrier_stats (store_id, carrier) {
        store_id -> BigInt,
        carrier -> Text,
        sent -> BigInt,
        delivered -> BigInt,
        returned -> BigInt,
        sum_delivery_days -> BigInt,
        sum_pickup_days -> BigInt,
    }
}

diesel::table! {
    current_store_stats (store_id) {
        store_id -> BigInt,
        sent -> BigInt,
        delivered -> BigInt,
        returned -> BigInt,
        sum_delivery_days -> BigInt,
        sum_pickup_days -> BigInt,
    }
}

diesel::table! {
    customers (id) {
        id -> BigInt,
        sent -> BigInt,
        delivered -> BigInt,
        returned -> BigInt,
    }
}

diesel::table! {
    daily_carrier_stats (store_id, carrier, day) {
        store_id -> BigInt,
        carrier -> Text,
        day -> Date,
        sent -> BigInt,
        delivered -> BigInt,
        returned -> BigInt,
        sum_delivery_days -> BigInt,
        sum_pickup_days -> BigInt,
    }
}

diesel::table! {
    daily_store_stats (store_id, day) {
        store_id -> BigInt,
        day -> Date,
        sent -> BigInt,
        delivered -> BigInt,
        returned -> BigInt,
        sum_delivery_days -> BigInt,
        sum_pickup_days -> BigInt,
    }
}

diesel::table! {
    delivery_history (parcel_id) {
        parcel_id -> BigInt,
        store_id -> BigInt,
        carrier -> Nullable<Text>,
        send_date -> Nullable<Text>,
        arrived_date -> Nullable<Text>,
        received_date -> Nullable<Text>,
        returned_date -> Nullable<Text>,
    }
}

diesel::table! {
    parcels (id) {
        id -> BigInt,
        track_number -> Text,
        store_id -> BigInt,
        customer_id -> Nullable<BigInt>,
        status -> Text,
        included_in_statistics -> Bool,
        updated_at -> Text,
    }
}

diesel::table! {
    rollup_carrier_stats (store_id, carrier, granularity, period_year, period_number) {
        store_id -> BigInt,
        carrier -> Text,
        granularity -> Text,
        period_year -> Integer,
        period_number -> Integer,
        sent -> BigInt,
        delivered -> BigInt,
        returned -> BigInt,
        sum_delivery_days -> BigInt,
        sum_pickup_days -> BigInt,
    }
}

diesel::table! {
    rollup_fold_log (day) {
        day -> Date,
        folded_at -> Text,
    }
}

diesel::table! {
    rollup_store_stats (store_id, granularity, period_year, period_number) {
        store_id -> BigInt,
        granularity -> Text,
        period_year -> Integer,
        period_number -> Integer,
        sent -> BigInt,
        delivered -> BigInt,
        returned -> BigInt,
        sum_delivery_days -> BigInt,
        sum_pickup_days -> BigInt,
    }
}

diesel::table! {
    stores (id) {
        id -> BigInt,
        owner_id -> BigInt,
        name -> Text,
    }
}

diesel::joinable!(current_carrier_stats -> stores (store_id));
diesel::joinable!(current_store_stats -> stores (store_id));
diesel::joinable!(daily_carrier_stats -> stores (store_id));
diesel::joinable!(daily_store_stats -> stores (store_id));
diesel::joinable!(delivery_history -> parcels (parcel_id));
diesel::joinable!(parcels -> stores (store_id));
diesel::joinable!(rollup_carrier_stats -> stores (store_id));
diesel::joinable!(rollup_store_stats -> stores (store_id));

diesel::allow_tables_to_appear_in_same_query!(
    current_carrier_stats,
    current_store_stats,
    customers,
    daily_carrier_stats,
    daily_store_stats,
    delivery_history,
    parcels,
    rollup_carrier_stats,
    rollup_fold_log,
    rollup_store_stats,
    stores,
);
