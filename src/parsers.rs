pub mod command_parser;

pub use command_parser::{
    ParsedCommand, parse_channel_ref, parse_date, parse_time_of_day, parse_user_mention,
    parse_user_name, time_of_day_to_timestamp,
};
