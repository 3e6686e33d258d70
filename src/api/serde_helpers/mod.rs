pub mod option_field_as_string;
