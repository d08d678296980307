// All prompt constants for the Listing Generator.

/// System prompt for listing generation.
pub const LISTINGS_SYSTEM: &str = "You are a real estate agent who is creating a listing for a new \
    property. You need to provide a detailed description of the property to attract potential buyers.";

/// Listing generation prompt. Replace `{count}` before sending.
pub const LISTINGS_PROMPT_TEMPLATE: &str = r#"Provide detailed information about {count} imaginary properties to attract potential buyers.
Return a single JSON object whose keys are "property_1" through "property_{count}" and whose values are the property listings.
Every listing must follow the schema below and the format of the example.

IMPORTANT: Prices start with "$" and house sizes end with "sqft". Bedrooms and bathrooms are positive numbers.
IMPORTANT: Avoid creating an "Augmented Description" field.

Please only answer in a json format without any additional text!"#;

/// Worked example of one generated listing.
pub const LISTINGS_FEW_SHOT_EXAMPLE: &str = r#"{
    "property_1": {
        "Neighborhood": "Green Oaks",
        "Price": "$800,000",
        "Bedrooms": 3,
        "Bathrooms": 2,
        "House Size": "2,000 sqft",
        "Description": "Welcome to this eco-friendly oasis nestled in the heart of Green Oaks. This charming 3-bedroom, 2-bathroom home boasts energy-efficient features such as solar panels and a well-insulated structure. Natural light floods the living spaces, highlighting the beautiful hardwood floors and eco-conscious finishes. The open-concept kitchen and dining area lead to a spacious backyard with a vegetable garden, perfect for the eco-conscious family. Neighborhood Description: Green Oaks is a close-knit, environmentally-conscious community with access to organic grocery stores, community gardens, and bike paths. With easy access to public transportation and bike lanes, commuting is a breeze."
    }
}"#;

pub fn build_listings_prompt(count: usize) -> String {
    LISTINGS_PROMPT_TEMPLATE.replace("{count}", &count.to_string())
}
