// All prompt constants for the Personalizer.

use serde_json::{json, Value};

/// Key the model must return.
pub const AUGMENTED_DESCRIPTION_KEY: &str = "Augmented Description";

pub const PERSONALIZATION_SYSTEM: &str = "You are an AI language model tasked with augmenting \
property listings to better match the specific preferences of potential buyers. Your goal is to \
enhance the descriptions by subtly emphasizing features that align with the buyer's interests, \
while maintaining factual integrity.

Guidelines:

* LLM Augmentation:
Review the description of each property listing.
Identify and emphasize aspects of the property that align with the buyer's stated preferences.
Tailor the language to resonate with what the buyer is looking for, making the property more \
appealing without introducing any new information.

* Maintaining Factual Integrity:
Ensure that all augmented descriptions remain accurate and truthful.
Do not add, remove, or alter any factual information about the property.
Summarize the existing features in a way that highlights their relevance to the buyer's preferences.";

pub const PERSONALIZATION_FEW_SHOT_EXAMPLE: &str = r#"Buyer's Preferences:

How big do you want your house to be?: At least 3 bedrooms & 2 bathrooms
Which amenities would you like?: Would like to have a large swimming pool
What is the most important thing you wish your neighborhood had?: Great schools and parks nearby

Original Listing:
{
    "property_1": {
        "Neighborhood": "Lakeside",
        "Price": "$1,200,000",
        "Bedrooms": 5.0,
        "Bathrooms": 4.0,
        "House Size": "3,200 sqft",
        "Description": "Experience luxury living in this magnificent 5-bedroom, 4-bathroom home in Lakeside. The grand foyer leads to a formal living room with a fireplace and a dining room with elegant finishes. The chef's kitchen features custom cabinetry, a large island, and top-of-the-line appliances. The master suite includes a sitting area, a walk-in closet, and a luxurious bathroom with a jetted tub. The backyard offers a covered patio, a swimming pool, and a beautifully landscaped garden. Neighborhood Description: Lakeside is an upscale community with a private lake, walking trails, and a clubhouse. Residents enjoy access to exclusive amenities such as tennis courts and a fitness center. The neighborhood is also close to prestigious schools and fine dining establishments.",
        "Augmented Description": null
    }
}

The output should be:
{"Augmented Description": "Experience luxury living in this magnificent 5-bedroom, 4-bathroom home in Lakeside. Ideal for families, this spacious home features a grand foyer leading to a formal living room with a fireplace and a dining room with elegant finishes. The chef's kitchen, with its custom cabinetry, large island, and top-of-the-line appliances, is perfect for preparing family meals. The master suite includes a sitting area, a walk-in closet, and a luxurious bathroom with a jetted tub. The backyard offers a covered patio, a large swimming pool, and a beautifully landscaped garden, perfect for outdoor activities and relaxation. Lakeside is an upscale community known for its prestigious schools and nearby parks, making it an ideal location for families. Residents enjoy access to exclusive amenities such as tennis courts, a fitness center, a private lake, walking trails, and a clubhouse."}"#;

/// Both values are inserted verbatim; neither is scanned for placeholders.
pub fn build_personalization_prompt(buyer_preferences: &str, listing_description: &str) -> String {
    format!(
        "The buyer's preferences are as follows:\n{buyer_preferences}\n\n\
         The listing found relevant for the buyer is: {listing_description}\n\n\
         Please augment the description of the listing to better match the buyer's preferences."
    )
}

/// Output schema hint: a single-field object.
pub fn augmented_description_schema() -> Value {
    json!({
        "title": "AugmentedDescription",
        "type": "object",
        "properties": {
            AUGMENTED_DESCRIPTION_KEY: {
                "title": AUGMENTED_DESCRIPTION_KEY,
                "type": "string",
                "description": "Augmented description of the house"
            }
        },
        "required": [AUGMENTED_DESCRIPTION_KEY]
    })
}
