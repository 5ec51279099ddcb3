use rand::seq::SliceRandom;
use rand::thread_rng;

const ADJECTIVES: &[&str] = &[
    "Agile",
    "Brisk",
    "Calm",
    "Daring",
    "Eager",
    "Fierce",
    "Gentle",
    "Happy",
    "Icy",
    "Jolly",
    "Kind",
    "Lively",
    "Mighty",
    "Nimble",
    "Optimal",
    "Proud",
    "Quick",
    "Royal",
    "Sunny",
    "Tricky",
    "Upbeat",
    "Vivid",
    "Witty",
    "Xenial",
    "Youthful",
    "Zesty",
    "Bold",
    "Clever",
    "Dreamy",
    "Epic",
    "Fancy",
    "Glowing",
    "Heroic",
    "Inventive",
    "Joyful",
    "Keen",
    "Lucky",
    "Magnetic",
    "Nifty",
    "Open",
    "Peaceful",
    "Quirky",
    "Radiant",
    "Swift",
    "Talented",
    "Unique",
    "Vast",
    "Warm",
    "Zany",
    "Active",
    "Brave",
    "Charming",
    "Delightful",
    "Electric",
    "Fearless",
    "Graceful",
    "Honest",
    "Inspiring",
    "Jaunty",
    "Mellow",
    "Noble",
    "Optimistic",
    "Playful",
    "Quiet",
    "Resilient",
    "Spirited",
    "Tenacious",
    "Vibrant",
    "Whimsical",
    "Zealous",
];

const ANIMALS: &[&str] = &[
    "Albatross",
    "Bison",
    "Cougar",
    "Dolphin",
    "Eagle",
    "Falcon",
    "Giraffe",
    "Hedgehog",
    "Iguana",
    "Jaguar",
    "Koala",
    "Lemur",
    "Manatee",
    "Narwhal",
    "Octopus",
    "Panda",
    "Quokka",
    "Raccoon",
    "Salmon",
    "Tiger",
    "Urchin",
    "Vulture",
    "Wolf",
    "Xerus",
    "Yak",
    "Zebra",
    "Antelope",
    "Beaver",
    "Coyote",
    "Duck",
    "Elephant",
    "Fox",
    "Goose",
    "Heron",
    "Impala",
    "Jay",
    "Kingfisher",
    "Llama",
    "Moose",
    "Newt",
    "Ocelot",
    "Pelican",
    "Quail",
    "Rabbit",
    "Seal",
    "Turtle",
    "Viper",
    "Walrus",
    "Aardvark",
    "Buffalo",
    "Chinchilla",
    "Deer",
    "Emu",
    "Ferret",
    "Gazelle",
    "Hamster",
    "Ibex",
    "Jackal",
    "Kiwi",
    "Lion",
    "Osprey",
    "Robin",
    "Swan",
    "Tapir",
    "Wolverine",
    "Armadillo",
    "Badger",
    "Caracal",
    "Dingo",
    "Echidna",
    "Flamingo",
    "Gorilla",
    "Hyena",
    "Kangaroo",
    "Leopard",
    "Mole",
    "Orca",
    "Parrot",
    "Reindeer",
    "Stingray",
    "Toucan",
    "Wombat",
];

/// Generates a friendly anonymous display name, like "Nimble Quokka"
pub fn generate_display_name() -> String {
    let mut rng = thread_rng();

    let adjective = ADJECTIVES
        .choose(&mut rng)
        .copied()
        .unwrap_or("Anonymous");
    let animal = ANIMALS.choose(&mut rng).copied().unwrap_or("Animal");

    format!("{} {}", adjective, animal)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_generate_display_name() {
        let name = generate_display_name();
        let parts: Vec<_> = name.split(' ').collect();

        assert_eq!(parts.len(), 2);
        assert!(ADJECTIVES.contains(&parts[0]));
        assert!(ANIMALS.contains(&parts[1]));
    }
}
