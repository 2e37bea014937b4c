mod daily_csv_router;

pub use daily_csv_router::*;
