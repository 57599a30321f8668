pub mod channels;
pub mod news;
pub mod samples;
pub mod subscriptions;
pub mod trainings;
pub mod uploads;
pub mod users;
