/// ExerciseDB (RapidAPI) client.
pub mod exercisedb;

/// Hugging Face inference router client.
pub mod inference;
