pub mod api_email;
pub mod db_email;
pub mod new_email;
