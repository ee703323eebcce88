//! Fixed category sets for the company-specific categorization strategies.
//!
//! These are closed enumerations: a strategy may only ever emit a member of
//! its set (or the shared "Uncategorized" label), never free text.

/// Label used when no strategy match clears its threshold
pub const UNCATEGORIZED: &str = "Uncategorized";

/// Landscaping service categories (strict keyword company)
pub const AEON_CATEGORIES: &[&str] = &[
    "Straw Installation",
    "Straw Removal",
    "Cleaning/loading sidewalk debris",
    "Hauling sidewalk debris",
    "Spreading Debris at Stockpile",
    "Cleaning/Loading Debris",
    "Excavate Infiltration",
    "Supply Material (Infiltration)",
    "Install Infiltration",
    "Backfill Infiltration",
    "Compaction infiltration",
    "Relevel After Infiltration Backfill",
    "Initial Install of Slabs and Steps (Rear)",
    "Temporary Installation of Slabs and Steps (Front)",
    "Relevel Slabs",
    "Initial install of window wells",
    "Grading Work",
    "Topping Up Under Structures",
    "Filter Cloth Installation",
    "Regrading washouts due to heavy rains",
    "Grade & Sod Contract Completions",
    "Extra Deep Sod (125 feet)",
    "Removing filter cloth from rear yard",
    "Loading & Hauling Topsoil/Fill Stockpile Within Site",
    "Spreading at Stockpile",
    "Leveling at Stockpile",
    "Loading & Hauling Topsoil/Fill from Lots to Stockpile",
    "Loading & Hauling Topsoil/Fill from Lot to Lot",
    "Spreading Topsoil on Lots",
    "Spreading Topsoil",
    "Loading & Hauling Topsoil/Fill from Stockpile to Lots",
    "Importing Topsoil/Fill From Offsite",
    "Topsoil Placement for In-Betweens",
    "Spreading/Topping Up In-Betweens",
    "Removing Rocks & Debris from Topsoil",
    "Sod Removal",
    "Settlement Repairs",
    "Curb settlement repairs",
    "Sod Material for Curb Repair",
    "Driveway Edge Settlement Repairs",
    "Sod Material for Driveway Edge",
    "Miscellaneous",
    "Bin Management",
    "Indoor Cleaning",
    "Garbage Collection",
    "Brick Management",
    "Concrete Work",
    "Equipment Supply",
    "Garage Filling & Leveling",
    "Labor Supply",
    "Road Maintenance",
    "Wall & Fence Installation",
    "Water Management",
    "Drainage System Installation",
    "Sod Installation",
];

/// Extra keyword aliases for the strict strategy, beyond the category names
/// themselves. Keyword, then the category it maps to (which must be a member
/// of `AEON_CATEGORIES`).
pub const AEON_KEYWORD_ALIASES: &[(&str, &str)] = &[
    ("straw install", "Straw Installation"),
    ("install straw", "Straw Installation"),
    ("remove straw", "Straw Removal"),
    ("window well", "Initial install of window wells"),
    ("grading", "Grading Work"),
    ("regrading", "Regrading washouts due to heavy rains"),
    ("filter cloth", "Filter Cloth Installation"),
    ("sod install", "Sod Installation"),
    ("install sod", "Sod Installation"),
    ("sod removal", "Sod Removal"),
    ("remove sod", "Sod Removal"),
    ("settlement repair", "Settlement Repairs"),
    ("curb settlement", "Curb settlement repairs"),
    ("garbage", "Garbage Collection"),
    ("indoor cleaning", "Indoor Cleaning"),
    ("concrete", "Concrete Work"),
    ("drainage", "Drainage System Installation"),
    ("excavate infiltration", "Excavate Infiltration"),
    ("backfill infiltration", "Backfill Infiltration"),
    ("spreading topsoil", "Spreading Topsoil"),
];

/// Excavating operation categories (semantic company), most-specific first
pub const AE3_CATEGORIES: &[&str] = &[
    // Highly specific operations
    "Ripping Basement",
    "Ripping Sewers",
    "Ripping Base",
    "Ripping Backfill",
    "Stockpile Sewer",
    "Stockpile Basement",
    "Backfill Basement",
    "Sewer Backfill",
    "Sewer Excavation",
    "Basement Excavation",
    "Double Cast Sewer",
    "Double Cast Basement",
    "Straw Installation",
    "Straw Removal",
    "Strip Topsoil prior to Excavation",
    "Driveway Cut",
    // Moderately specific operations
    "Loading Fill From Lots",
    "Loading Fill To Lots",
    "Haul From Stockpile",
    "Haul To Stockpile",
    "Loading Excess Fill Offsite",
    "Hauling Excess Fill Offsite",
    "Spreading At Stockpile",
    "Rough Grade",
    "Low Lots",
    "Base Condition",
    "Concrete Work",
    "Mud",
    // General operations
    "General Stockpile",
    "Grade",
    "Releveling",
    "Spreading/Top Up",
    "Cast/ Double Cast",
    "General Straw",
    "Road",
    "Tarp",
    "Flagman",
    "Snow",
    "Ramp",
    // Default case
    "Miscellaneous",
];

/// Direction corrections for near-miss labels the semantic stage may land on.
/// The left side is scored as a candidate; the right side is what gets emitted.
pub const AE3_SUBSTITUTIONS: &[(&str, &str)] = &[
    ("Haul From Lots", "Haul To Stockpile"),
    ("Haul To Lots", "Haul From Stockpile"),
    ("Loading Fill To Stockpile", "Loading Fill From Lots"),
    ("Loading Fill From Stockpile", "Loading Fill To Lots"),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alias_targets_are_members() {
        for (_, category) in AEON_KEYWORD_ALIASES {
            assert!(
                AEON_CATEGORIES.contains(category),
                "alias target {} not in AEON set",
                category
            );
        }
    }

    #[test]
    fn test_substitution_targets_are_members() {
        for (alias, category) in AE3_SUBSTITUTIONS {
            assert!(!AE3_CATEGORIES.contains(alias));
            assert!(
                AE3_CATEGORIES.contains(category),
                "substitution target {} not in AE3 set",
                category
            );
        }
    }
}
