//! Fixed instructions sent to the generative service.

/// Prefix applied to the user query before it is embedded for ranking.
pub const QUERY_PREFIX: &str = "Songs that match the vibe of: ";

#[must_use]
pub fn ranking_query(query: &str) -> String {
    format!("{QUERY_PREFIX}{query}")
}

#[must_use]
pub fn candidate_instruction(count: usize) -> String {
    format!(
        r#"You are a music recommendation expert.
Given a user description, return {count} real, well-known songs that either fit the mood or suit the user's request.
Only return a JSON list of song titles and artists. Do not invent non-existent songs.
If a track has multiple artists, join them with a comma and a space, e.g. "The Weeknd, JENNIE, Lily-Rose Depp".

Respond only with JSON using this format:
{{
  "tracks": [
    {{ "artists": "Drake", "track": "Headlines" }},
    {{ "artists": "Avicii", "track": "Wake Me Up" }},
    {{ "artists": "Taylor Swift", "track": "You Belong With Me" }},
    {{ "artists": "Lauryn Hill", "track": "Ex-Factor" }},
    {{ "artists": "Kanye West, Chris Martin", "track": "Homecoming" }}
  ]
}}"#
    )
}

pub const DESCRIPTION_INSTRUCTION: &str = r#"You are a music recommendation expert.
Given a JSON list of songs, containing artists and track information, write a one-sentence summary for each song. Focus on its mood, lyrical theme, genre and emotional impact. Avoid technical jargon and make it sound like a music critic describing the song to a friend.
Return the given JSON list of song titles and artists with a description added to each entry. Keep every entry, in the same order, with artists and track unchanged.

Respond only with JSON using this format:
{
  "tracks": [
    {
      "artists": "Drake",
      "track": "Headlines",
      "description": "A confident, introspective hip-hop anthem where Drake reflects on fame, ambition, and staying true to himself."
    },
    {
      "artists": "Avicii",
      "track": "Wake Me Up",
      "description": "An uplifting EDM-folk fusion that captures the restless spirit of youth searching for purpose and belonging."
    },
    {
      "artists": "Lauryn Hill",
      "track": "Ex-Factor",
      "description": "A soulful, emotionally raw R&B ballad about heartbreak, self-worth, and the pain of a toxic relationship."
    }
  ]
}"#;
